//! Error types for xiaoclaw
//!
//! Uses `thiserror` for the library error enum. Provider failures carry a
//! structured [`ProviderError`] classification so the retry layer can decide
//! without string matching.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
#[derive(Debug)]
pub enum ProviderError {
    /// 401 - Invalid API key or authentication failure
    Auth(String),
    /// 429 - Rate limit or quota exceeded
    RateLimit(String),
    /// 402 - Payment required or billing issue
    Billing(String),
    /// 500/502/503/504 - Server-side errors
    ServerError(String),
    /// 400 - Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 - Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Provider is overloaded, retry with backoff
    Overloaded(String),
    /// Request format error, do not retry
    Format(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Format(msg) => write!(f, "Format error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Format(_) => Some(400),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for XiaoError {
    fn from(err: ProviderError) -> Self {
        XiaoError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for xiaoclaw operations.
#[derive(Error, Debug)]
pub enum XiaoError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors (missing provider, malformed responses)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification for retry decisions.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool execution errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// Arguments passed to a tool do not match its schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Session management errors (invalid state, persistence failures)
    #[error("Session error: {0}")]
    Session(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found (sessions, files, tasks)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Blocked by the security gate
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// Admission rejected by the rate limiter
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// An operation exceeded its wall-clock budget
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl XiaoError {
    /// Short, stable label for the error kind, used when rendering tool failures.
    pub fn kind_name(&self) -> &'static str {
        match self {
            XiaoError::Config(_) => "ConfigError",
            XiaoError::Provider(_) | XiaoError::ProviderTyped(_) => "ProviderError",
            XiaoError::Tool(_) => "ToolError",
            XiaoError::InvalidArguments(_) => "InvalidArguments",
            XiaoError::Session(_) => "SessionError",
            XiaoError::Io(_) => "IoError",
            XiaoError::Json(_) => "JsonError",
            XiaoError::Http(_) => "HttpError",
            XiaoError::NotFound(_) => "NotFound",
            XiaoError::SecurityViolation(_) => "SecurityViolation",
            XiaoError::RateLimited(_) => "RateLimited",
            XiaoError::Timeout(_) => "Timeout",
        }
    }
}

/// A specialized `Result` type for xiaoclaw operations.
pub type Result<T> = std::result::Result<T, XiaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = XiaoError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: XiaoError = io_err.into();
        assert!(matches!(err, XiaoError::Io(_)));
        assert_eq!(err.kind_name(), "IoError");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: XiaoError = json_err.into();
        assert!(matches!(err, XiaoError::Json(_)));
    }

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimit("slow down".into()).is_retryable());
        assert!(ProviderError::ServerError("boom".into()).is_retryable());
        assert!(ProviderError::Overloaded("busy".into()).is_retryable());
        assert!(!ProviderError::Auth("bad key".into()).is_retryable());
        assert!(!ProviderError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(ProviderError::Auth(String::new()).status_code(), Some(401));
        assert_eq!(ProviderError::Billing(String::new()).status_code(), Some(402));
        assert_eq!(ProviderError::Timeout(String::new()).status_code(), None);
    }

    #[test]
    fn test_provider_typed_conversion() {
        let err: XiaoError = ProviderError::RateLimit("429".into()).into();
        assert!(matches!(err, XiaoError::ProviderTyped(_)));
        assert!(err.to_string().contains("Rate limit error"));
    }
}
