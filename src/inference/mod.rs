pub mod llama;
pub mod loader;

use crate::error::GenerationError;

pub use llama::CausalLm;

/// Fixed per-process generation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Total sequence length in tokens, prompt included.
    pub max_length: usize,
    pub num_return_sequences: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: crate::config::DEFAULT_MAX_LENGTH,
            num_return_sequences: crate::config::DEFAULT_NUM_RETURN_SEQUENCES,
        }
    }
}

/// Blocking prompt-to-text generation. Implementations are shared
/// read-only across requests.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String, GenerationError>;
}
