//! Configuration management for xiaoclaw
//!
//! Configuration is loaded from `~/.xiaoclaw/config.json` with environment
//! variable overrides. The resolved `Config` is passed explicitly into the
//! components that need it; there is no process-wide config state.

mod types;

pub use types::*;

use crate::error::Result;
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the xiaoclaw configuration directory path (~/.xiaoclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".xiaoclaw")
    }

    /// Returns the path to the config file (~/.xiaoclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("XIAOCLAW_WORKSPACE") {
            self.workspace = val;
        }
        if let Ok(val) = std::env::var("XIAOCLAW_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("XIAOCLAW_MAX_ROUNDS") {
            if let Ok(v) = val.parse() {
                self.agent.max_rounds = v;
            }
        }
        if let Ok(val) = std::env::var("XIAOCLAW_STREAMING") {
            if let Ok(v) = val.parse() {
                self.agent.streaming = v;
            }
        }
        if let Ok(val) = std::env::var("XIAOCLAW_MAX_CONTEXT_TOKENS") {
            if let Ok(v) = val.parse() {
                self.session.max_context_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("XIAOCLAW_SECURITY_LEVEL") {
            match val.parse() {
                Ok(level) => self.security.level = level,
                Err(e) => tracing::warn!(error = %e, "Ignoring XIAOCLAW_SECURITY_LEVEL"),
            }
        }
        if let Ok(val) = std::env::var("XIAOCLAW_LOG_LEVEL") {
            self.logging.level = val;
        }

        // OpenAI-compatible provider
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            if !val.trim().is_empty() {
                self.provider.api_key = Some(val);
            }
        }
        if let Ok(val) = std::env::var("OPENAI_BASE_URL") {
            if !val.trim().is_empty() {
                self.provider.api_base = Some(val);
            }
        }
    }

    /// Workspace path with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    /// Session directory with `~` expanded.
    pub fn sessions_path(&self) -> PathBuf {
        match &self.session.dir {
            Some(dir) => expand_home(dir),
            None => Self::dir().join("sessions"),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.max_rounds, 10);
        assert_eq!(config.session.max_context_tokens, 8000);
        assert_eq!(config.session.keep_recent, 4);
        assert_eq!(config.security.level, SecurityLevel::Strict);
        assert_eq!(config.rate_limit.max_calls, 30);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.tools.exec_timeout_secs, 30);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent": {"model": "local-model"}}"#).unwrap();
        assert_eq!(config.agent.model, "local-model");
        assert_eq!(config.agent.max_rounds, 10);
        assert!(config.provider.api_key.is_none());
    }

    #[test]
    fn test_security_level_deserialize() {
        let config: Config = serde_json::from_str(r#"{"security": {"level": "relaxed"}}"#).unwrap();
        assert_eq!(config.security.level, SecurityLevel::Relaxed);
        assert!(config.security.audit_log);
    }

    #[test]
    fn test_security_level_from_str() {
        assert_eq!("STRICT".parse::<SecurityLevel>(), Ok(SecurityLevel::Strict));
        assert_eq!("normal".parse::<SecurityLevel>(), Ok(SecurityLevel::Normal));
        assert!("lax".parse::<SecurityLevel>().is_err());
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_path(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config.session.compaction_threshold, 6000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"tools": {"disabled": ["exec"]}, "rate_limit": {"max_calls": 3}}"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.tools.disabled, vec!["exec".to_string()]);
        assert_eq!(config.rate_limit.max_calls, 3);
        assert_eq!(config.rate_limit.window_secs, 60);
    }

    #[test]
    fn test_load_invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/ws"), home.join("ws"));
        }
    }

    #[test]
    fn test_sessions_path_override() {
        let mut config = Config::default();
        config.session.dir = Some("/var/lib/xiaoclaw".to_string());
        assert_eq!(config.sessions_path(), PathBuf::from("/var/lib/xiaoclaw"));
    }
}
