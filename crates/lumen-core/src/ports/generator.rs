//! ExplanationGenerator port - explanation + animation script from a prompt.

use async_trait::async_trait;

use crate::domain::{Generation, GenerationError};

/// Asks a model provider for an explanation and (optionally) a script.
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    /// Full prompt: detailed explanation plus animation script.
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError>;

    /// Shorter fallback prompt used after `generate` failed or timed out.
    async fn generate_simple(&self, prompt: &str) -> Result<Generation, GenerationError>;

    /// Cheap round trip used by the AI health check.
    async fn ping(&self) -> Result<(), GenerationError>;
}
