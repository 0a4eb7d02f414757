//! Built-in template generator.
//!
//! Renders a deterministic markdown skeleton from the catalog's expected
//! sections. Used by the CLI when no real backend is wired up, and handy in
//! demos: the output is stable for a given kind, which also makes the
//! refresh-determinism guarantees easy to observe end to end.

use anyhow::Result;
use async_trait::async_trait;

use super::trait_def::{ContentGenerator, GeneratedContent, GenerationRequest};

/// Deterministic markdown generator backed by the artifact catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        let kind = request.kind;
        let mut body = format!("# {}\n", kind.title());
        for section in kind.expected_sections() {
            body.push_str("\n## ");
            body.push_str(section);
            body.push_str("\n\nTo be worked through with your coach.\n");
        }

        Ok(GeneratedContent { body })
    }
}
