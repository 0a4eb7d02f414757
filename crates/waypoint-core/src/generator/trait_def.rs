//! The `ContentGenerator` trait -- the adapter interface for content backends.
//!
//! The pipeline calls a generator once per artifact. The trait is
//! intentionally object-safe so it can be shared as `Arc<dyn ContentGenerator>`
//! between the HTTP handlers and spawned generation tasks.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::catalog::ArtifactKind;

/// Everything a generator gets to work with for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The user the plan belongs to. Opaque to the generator beyond being a
    /// lookup key for upstream context (interview answers, module notes).
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub kind: ArtifactKind,
}

/// The produced artifact body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub body: String,
}

/// Adapter interface for producing artifact content.
///
/// Implementors wrap a specific backend (an LLM call upstream of this
/// repository, or the built-in template renderer) behind one async call.
///
/// # Object Safety
///
/// This trait is object-safe: it can be stored as `Arc<dyn ContentGenerator>`
/// and handed to spawned tasks.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Human-readable name for this generator (e.g. "template").
    fn name(&self) -> &str;

    /// Produce the body for one artifact.
    ///
    /// Errors are recorded on the artifact row by the caller; they must not
    /// affect sibling artifacts. Implementations should not retry internally
    /// -- retry policy belongs to the pipeline.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent>;
}

// Compile-time assertion: ContentGenerator must be object-safe.
// If this line compiles, the trait can be used as `dyn ContentGenerator`.
const _: () = {
    fn _assert_object_safe(_: &dyn ContentGenerator) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivial generator that echoes the artifact kind, used only to prove
    /// the trait can be implemented and used as `dyn ContentGenerator`.
    struct EchoGenerator;

    #[async_trait]
    impl ContentGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
            Ok(GeneratedContent {
                body: request.kind.key().to_owned(),
            })
        }
    }

    #[test]
    fn generator_is_object_safe() {
        let generator: Box<dyn ContentGenerator> = Box::new(EchoGenerator);
        assert_eq!(generator.name(), "echo");
    }

    #[tokio::test]
    async fn echo_generator_produces_kind_key() {
        let generator: Box<dyn ContentGenerator> = Box::new(EchoGenerator);
        let request = GenerationRequest {
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            kind: ArtifactKind::ActionPlan,
        };

        let content = generator.generate(&request).await.unwrap();
        assert_eq!(content.body, "action_plan");
    }
}
