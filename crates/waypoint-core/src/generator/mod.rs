//! Content generator interface for plan artifacts.
//!
//! This module defines the [`ContentGenerator`] trait the pipeline invokes
//! once per artifact, plus the fixed artifact catalog ([`ArtifactKind`]) and
//! the built-in [`TemplateGenerator`].
//!
//! # Architecture
//!
//! ```text
//! Generation runner
//!     |
//!     v
//! &dyn ContentGenerator
//!     |
//!     |   generate(GenerationRequest { user_id, plan_id, kind })
//!     |        |
//!     |        v
//!     |   GeneratedContent { body }
//! ```
//!
//! The real LLM-backed generator lives upstream of this crate; here the
//! trait is the seam, and [`TemplateGenerator`] is the deterministic
//! built-in used by the CLI and as a fallback.

pub mod catalog;
pub mod template;
pub mod trait_def;

// Re-export the primary public API at the module level.
pub use catalog::ArtifactKind;
pub use template::TemplateGenerator;
pub use trait_def::{ContentGenerator, GeneratedContent, GenerationRequest};
