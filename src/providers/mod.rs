//! Providers module - LLM provider abstraction
//!
//! Defines the `LLMProvider` trait and common types, the OpenAI-compatible
//! client and the retry decorator the agent wraps every provider in.
//!
//! # Example
//!
//! ```rust,ignore
//! use xiaoclaw::providers::{ChatOptions, LLMProvider, OpenAIProvider};
//! use xiaoclaw::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!
//!     let response = provider.chat(messages, vec![], None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
pub mod retry;
mod types;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;

pub use openai::OpenAIProvider;
pub use retry::RetryProvider;
pub use types::{
    ChatOptions, LLMProvider, LLMResponse, LLMToolCall, StreamEvent, ToolDefinition, Usage,
};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        408 => ProviderError::Timeout(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 | 422 => ProviderError::InvalidRequest(body.to_string()),
        503 | 529 => ProviderError::Overloaded(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

/// Build the configured provider, or `None` when no API key is set (offline mode).
///
/// The returned provider is not yet wrapped in [`RetryProvider`]; the agent
/// applies the retry policy when the provider is installed.
pub fn provider_from_config(config: &Config) -> Option<Arc<dyn LLMProvider>> {
    let api_key = config
        .provider
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())?;

    let provider = match &config.provider.api_base {
        Some(base) => OpenAIProvider::with_base_url(api_key, base),
        None => OpenAIProvider::new(api_key),
    }
    .with_model(&config.agent.model);

    info!(provider = "openai", model = %config.agent.model, "Provider configured");
    Some(Arc::new(provider))
}
