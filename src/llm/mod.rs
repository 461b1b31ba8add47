//! LLM integration.
//!
//! The pipeline only depends on the `LlmProvider` trait. The concrete backend
//! is an OpenAI-compatible chat completions client, wrapped in a
//! requests-per-minute limiter shared by every worker.

pub mod openai;
pub mod provider;
pub mod rate_limit;

pub use openai::OpenAiProvider;
pub use provider::*;
pub use rate_limit::RateLimitedProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub timeout: Duration,
    pub requests_per_minute: u32,
    /// Default sampling temperature when a request does not set one.
    pub temperature: Option<f32>,
}

/// Create the rate-limited LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let inner: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(config.clone())?);
    tracing::info!(
        "Using OpenAI-compatible endpoint {} (model: {}, rpm: {})",
        config.base_url,
        config.model,
        config.requests_per_minute
    );
    Ok(Arc::new(RateLimitedProvider::new(
        inner,
        config.requests_per_minute,
    )))
}
