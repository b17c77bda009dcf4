//! Prompt used for vision description calls.
//!
//! Centralized so the default behaviour can be changed in exactly one place
//! and so unit tests can inspect the prompt without a live provider.
//! Callers override it via [`crate::config::EngineConfig::description_prompt`].

/// Default prompt asking the vision model to describe one document image.
///
/// The downstream consumer is a structured-extraction step, so the prompt
/// asks for inventory-grade content (objects, visible text, quantities)
/// rather than aesthetic commentary.
pub const DEFAULT_DESCRIPTION_PROMPT: &str = "\
Describe this image from a document precisely and factually.

- List the objects, people, and scenes visible.
- Transcribe any readable text, labels, numbers, or signatures verbatim.
- Describe charts, stamps, and diagrams by their content, not their style.
- Keep it compact: a few sentences, no speculation, no commentary.";

/// Fixed text substituted when the per-page vision quota is exhausted.
pub const QUOTA_PLACEHOLDER: &str = "(description skipped — vision quota reached)";

/// Fixed text substituted when a description call fails or times out.
pub const FAILURE_PLACEHOLDER: &str = "(description unavailable)";
