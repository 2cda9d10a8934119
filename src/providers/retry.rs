//! Retry provider - decorator that adds automatic retry with exponential backoff.
//!
//! Wraps any [`LLMProvider`] to transparently retry transient errors such as
//! HTTP 429 (rate limit), 5xx (server errors), timeouts and transport failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xiaoclaw::providers::{OpenAIProvider, RetryProvider};
//!
//! let inner = Arc::new(OpenAIProvider::new("api-key"));
//! let provider = RetryProvider::new(inner)
//!     .with_max_attempts(3)
//!     .with_base_delay_ms(500);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Result, XiaoError};
use crate::session::Message;

use super::{ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition};

/// Patterns in untyped error messages that indicate a transient failure.
const RETRYABLE_PATTERNS: &[&str] = &[
    "429",
    "500",
    "502",
    "503",
    "504",
    "rate limit",
    "rate_limit",
    "overloaded",
    "too many requests",
    "server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
];

/// A decorator provider that retries transient LLM errors with exponential backoff.
///
/// `max_attempts` counts the first try: with the default of 3 a failing call
/// is attempted three times, sleeping `base`, then `2·base` (plus jitter)
/// in between. Non-transient errors (auth, bad request, billing, unknown
/// model) are returned immediately.
pub struct RetryProvider {
    inner: Arc<dyn LLMProvider>,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl std::fmt::Debug for RetryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryProvider")
            .field("inner", &self.inner.name())
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .finish()
    }
}

impl RetryProvider {
    /// Wrap `inner` with the default policy (3 attempts, 500ms base, 8s cap).
    pub fn new(inner: Arc<dyn LLMProvider>) -> Self {
        Self::from_config(inner, &RetryConfig::default())
    }

    /// Wrap `inner` with the policy from configuration.
    pub fn from_config(inner: Arc<dyn LLMProvider>, config: &RetryConfig) -> Self {
        Self {
            inner,
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Set the total number of attempts (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the base delay in milliseconds for exponential backoff.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the maximum delay cap in milliseconds.
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    async fn backoff(&self, retry: u32, err: &XiaoError, op: &str) {
        warn!(
            provider = self.inner.name(),
            attempt = retry + 1,
            max_attempts = self.max_attempts,
            error = %err,
            "Retrying {} request after transient error",
            op
        );
        delay_with_jitter(retry - 1, self.base_delay_ms, self.max_delay_ms).await;
    }
}

/// Check whether an error represents a transient failure that should be retried.
pub fn is_retryable(err: &XiaoError) -> bool {
    match err {
        XiaoError::ProviderTyped(pe) => pe.is_retryable(),
        XiaoError::Http(_) | XiaoError::Timeout(_) => true,
        XiaoError::Provider(_) => {
            let msg = err.to_string().to_lowercase();
            if ["400", "401", "403", "404"].iter().any(|p| msg.contains(p)) {
                return false;
            }
            RETRYABLE_PATTERNS.iter().any(|p| msg.contains(p))
        }
        _ => false,
    }
}

/// Sleep for the backoff delay of a given retry (0-indexed).
///
/// Jitter comes from the sub-second part of the system clock, which is
/// enough to decorrelate concurrent retries.
pub async fn delay_with_jitter(retry: u32, base_delay_ms: u64, max_delay_ms: u64) {
    let jitter_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % (base_delay_ms / 4).max(1))
        .unwrap_or(0);

    let delay = compute_delay(retry, base_delay_ms, max_delay_ms, jitter_ms);
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
}

/// Backoff delay for a given retry: `min(base · 2^retry + jitter, max)`.
pub fn compute_delay(retry: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << retry.min(16));
    exponential.saturating_add(jitter_ms).min(max_delay_ms)
}

#[async_trait]
impl LLMProvider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let mut attempt = 0;
        loop {
            match self
                .inner
                .chat(messages.clone(), tools.clone(), model, options.clone())
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempt += 1;
                    if !is_retryable(&err) || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    self.backoff(attempt, &err, "chat").await;
                }
            }
        }
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let mut attempt = 0;
        loop {
            match self
                .inner
                .chat_stream(messages.clone(), tools.clone(), model, options.clone())
                .await
            {
                Ok(receiver) => return Ok(receiver),
                Err(err) => {
                    attempt += 1;
                    if !is_retryable(&err) || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    self.backoff(attempt, &err, "chat_stream").await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error for the first `failures` calls.
    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
        retryable: bool,
    }

    impl FlakyProvider {
        fn new(failures: u32, retryable: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                retryable,
            }
        }
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn default_model(&self) -> &str {
            "flaky-model"
        }

        async fn chat(
            &self,
            _messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(if self.retryable {
                    ProviderError::ServerError("boom".into()).into()
                } else {
                    ProviderError::Auth("bad key".into()).into()
                });
            }
            Ok(LLMResponse::text("ok"))
        }
    }

    fn fast(inner: Arc<FlakyProvider>) -> RetryProvider {
        RetryProvider::new(inner)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
    }

    #[test]
    fn test_defaults() {
        let provider = RetryProvider::new(Arc::new(FlakyProvider::new(0, true)));
        assert_eq!(provider.max_attempts, 3);
        assert_eq!(provider.base_delay_ms, 500);
        assert_eq!(provider.name(), "flaky");
        assert_eq!(provider.default_model(), "flaky-model");
    }

    #[test]
    fn test_is_retryable_classification() {
        assert!(is_retryable(&ProviderError::RateLimit("x".into()).into()));
        assert!(is_retryable(&XiaoError::Timeout("read".into())));
        assert!(is_retryable(&XiaoError::Provider("HTTP 503 Service Unavailable".into())));
        assert!(!is_retryable(&ProviderError::Auth("x".into()).into()));
        assert!(!is_retryable(&XiaoError::Provider("HTTP 404 Not Found".into())));
        assert!(!is_retryable(&XiaoError::Provider("connection reset".into())));
        assert!(!is_retryable(&XiaoError::Config("missing".into())));
    }

    #[test]
    fn test_compute_delay_doubles_and_caps() {
        assert_eq!(compute_delay(0, 500, 8_000, 0), 500);
        assert_eq!(compute_delay(1, 500, 8_000, 0), 1_000);
        assert_eq!(compute_delay(2, 500, 8_000, 100), 2_100);
        assert_eq!(compute_delay(10, 500, 8_000, 0), 8_000);
        assert_eq!(compute_delay(10, 500, 8_000, 5_000), 8_000);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let inner = Arc::new(FlakyProvider::new(2, true));
        let provider = fast(Arc::clone(&inner));
        let response = provider
            .chat(vec![], vec![], None, ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyProvider::new(10, true));
        let provider = fast(Arc::clone(&inner));
        let result = provider
            .chat(vec![], vec![], None, ChatOptions::default())
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let inner = Arc::new(FlakyProvider::new(1, false));
        let provider = fast(Arc::clone(&inner));
        let result = provider
            .chat(vec![], vec![], None, ChatOptions::default())
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_retries_too() {
        let inner = Arc::new(FlakyProvider::new(1, true));
        let provider = fast(Arc::clone(&inner));
        let mut rx = provider
            .chat_stream(vec![], vec![], None, ChatOptions::default())
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(StreamEvent::Delta(t)) if t == "ok"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
