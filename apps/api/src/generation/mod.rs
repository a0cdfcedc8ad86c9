pub mod handlers;
pub mod params;
pub mod prompts;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::generation::params::GenerationParams;

/// The external generation pipeline behind the prompt cache.
/// Production implementation: the Anthropic client in `llm_client`.
/// Tests substitute a counting stub so nothing touches the network.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, AppError>;
}
