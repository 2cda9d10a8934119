//! Configuration type definitions for xiaoclaw
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial `config.json` only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hooks::HooksConfig;

/// Main configuration struct for xiaoclaw
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace directory (tools resolve relative paths against it)
    pub workspace: String,
    /// Agent loop settings (model, rounds, streaming)
    pub agent: AgentConfig,
    /// Session storage and context window settings
    pub session: SessionConfig,
    /// Security gate settings
    pub security: SecurityConfig,
    /// Inbound rate limiting
    pub rate_limit: RateLimitConfig,
    /// LLM provider credentials
    pub provider: ProviderConfig,
    /// Provider retry policy
    pub retry: RetryConfig,
    /// Built-in tool settings
    pub tools: ToolsConfig,
    /// Rule-based hooks
    pub hooks: HooksConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: "~/.xiaoclaw/workspace".to_string(),
            agent: AgentConfig::default(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
            tools: ToolsConfig::default(),
            hooks: HooksConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier sent to the provider
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Hard ceiling on provider rounds per inbound message
    pub max_rounds: u32,
    /// Stream the final answer chunk by chunk when the caller supports it
    pub streaming: bool,
    /// Replaces the built-in identity prompt when set
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_rounds: 10,
            streaming: true,
            system_prompt: None,
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session storage and context-window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory for JSONL session files. Defaults to `~/.xiaoclaw/sessions`.
    pub dir: Option<String>,
    /// Token budget for the context window sent to the provider
    pub max_context_tokens: usize,
    /// Session token count above which compaction runs
    pub compaction_threshold: usize,
    /// Number of most recent messages compaction never touches
    pub keep_recent: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_context_tokens: 8000,
            compaction_threshold: 6000,
            keep_recent: 4,
        }
    }
}

// ============================================================================
// Security Configuration
// ============================================================================

/// How aggressively the security gate classifies actions as dangerous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Blocklist enforced (default)
    #[default]
    Strict,
    /// Blocklist enforced
    Normal,
    /// Nothing is classified as dangerous
    Relaxed,
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "normal" => Ok(Self::Normal),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(format!("unknown security level '{}'", other)),
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Normal => write!(f, "normal"),
            Self::Relaxed => write!(f, "relaxed"),
        }
    }
}

/// Per-user tool permissions. An empty `allow` list means every tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPermissions {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

/// Security gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Classification level
    pub level: SecurityLevel,
    /// Write `{workspace}/.xiaoclaw/audit.log`
    pub audit_log: bool,
    /// Tool permissions keyed by user id
    pub user_tools: HashMap<String, ToolPermissions>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            level: SecurityLevel::Strict,
            audit_log: true,
            user_tools: HashMap::new(),
        }
    }
}

// ============================================================================
// Rate Limit / Provider / Retry
// ============================================================================

/// Sliding-window admission settings, applied per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window. 0 disables limiting.
    pub max_calls: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 30,
            window_secs: 60,
        }
    }
}

/// OpenAI-compatible provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key. No key means offline mode.
    pub api_key: Option<String>,
    /// Base URL override (e.g. a local OpenAI-compatible server)
    pub api_base: Option<String>,
}

/// Provider retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per provider call (first try included)
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
    /// Backoff cap
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

// ============================================================================
// Tools Configuration
// ============================================================================

/// Built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tools registered but disabled at startup
    pub disabled: Vec<String>,
    /// Subprocess timeout for `exec`
    pub exec_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            exec_timeout_secs: 30,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Compact single-line text
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Optional log file (JSON format only)
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Component,
            file: None,
        }
    }
}
