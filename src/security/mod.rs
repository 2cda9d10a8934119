//! Security module for xiaoclaw
//!
//! The [`SecurityGate`] classifies shell-style actions against a blocklist,
//! enforces per-user tool permissions and records every decision in the
//! audit trail (see [`audit`]).

pub mod audit;

use std::collections::HashMap;
use std::path::Path;

use aho_corasick::AhoCorasick;
use serde_json::Value;
use tracing::warn;

use crate::config::{SecurityConfig, SecurityLevel, ToolPermissions};

pub use audit::{AuditCategory, AuditLog, AuditSeverity};

/// Substrings that mark a command as destructive (matched case-insensitively).
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf",
    "dd if=",
    "mkfs",
    "> /dev/",
    "format c:",
    "del /f",
];

/// Classifies actions and audits tool use.
///
/// # Example
///
/// ```
/// use xiaoclaw::config::{SecurityConfig, SecurityLevel};
/// use xiaoclaw::security::{AuditLog, SecurityGate};
///
/// let gate = SecurityGate::new(&SecurityConfig::default(), AuditLog::disabled());
/// assert!(gate.is_dangerous("sudo RM -RF /"));
/// assert!(!gate.is_dangerous("ls -la"));
/// ```
pub struct SecurityGate {
    level: SecurityLevel,
    matcher: Option<AhoCorasick>,
    user_tools: HashMap<String, ToolPermissions>,
    audit: AuditLog,
}

impl SecurityGate {
    /// Build a gate from configuration with an explicit audit sink.
    pub fn new(config: &SecurityConfig, audit: AuditLog) -> Self {
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(DANGEROUS_PATTERNS)
            .map_err(|e| warn!(error = %e, "Falling back to plain blocklist matching"))
            .ok();

        Self {
            level: config.level,
            matcher,
            user_tools: config.user_tools.clone(),
            audit,
        }
    }

    /// Build a gate auditing to `{workspace}/.xiaoclaw/audit.log` when enabled.
    pub fn for_workspace(config: &SecurityConfig, workspace: &Path) -> Self {
        let audit = if config.audit_log {
            AuditLog::in_workspace(workspace)
        } else {
            AuditLog::disabled()
        };
        Self::new(config, audit)
    }

    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Classify an action. Always audited as `BLOCKED` or `ALLOWED`.
    ///
    /// At level `relaxed` nothing is dangerous.
    pub fn is_dangerous(&self, action: &str) -> bool {
        let dangerous = self.level != SecurityLevel::Relaxed && self.matches_blocklist(action);
        if dangerous {
            self.audit.record(
                "BLOCKED",
                action,
                AuditCategory::ShellSecurity,
                AuditSeverity::Critical,
                true,
            );
        } else {
            self.audit.record(
                "ALLOWED",
                action,
                AuditCategory::ShellSecurity,
                AuditSeverity::Info,
                false,
            );
        }
        dangerous
    }

    fn matches_blocklist(&self, action: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(action),
            None => {
                let lower = action.to_lowercase();
                DANGEROUS_PATTERNS.iter().any(|p| lower.contains(p))
            }
        }
    }

    /// Record a tool invocation: the tool name and its argument keys, never values.
    pub fn log_tool_call(&self, name: &str, args: &Value) {
        let mut keys: Vec<&str> = args
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.sort_unstable();
        self.audit.record(
            "TOOL",
            &format!("{}({})", name, keys.join(", ")),
            AuditCategory::ToolInvocation,
            AuditSeverity::Info,
            false,
        );
    }

    /// Whether `user` may call `tool` under `security.user_tools`.
    ///
    /// Users without an entry may call everything. `deny` wins over `allow`;
    /// an empty `allow` list means every tool not denied.
    pub fn is_tool_allowed(&self, user: &str, tool: &str) -> bool {
        let Some(perms) = self.user_tools.get(user) else {
            return true;
        };
        if perms.deny.iter().any(|t| t == tool || t == "*") {
            return false;
        }
        perms.allow.is_empty() || perms.allow.iter().any(|t| t == tool || t == "*")
    }

    /// Audit a permission denial.
    pub fn log_tool_blocked(&self, user: &str, tool: &str) {
        self.audit.record(
            "TOOL_BLOCKED",
            &format!("{} for user {}", tool, user),
            AuditCategory::PolicyViolation,
            AuditSeverity::Warning,
            true,
        );
    }
}

impl std::fmt::Debug for SecurityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityGate")
            .field("level", &self.level)
            .field("audit", &self.audit.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn gate(level: SecurityLevel) -> SecurityGate {
        let config = SecurityConfig {
            level,
            ..SecurityConfig::default()
        };
        SecurityGate::new(&config, AuditLog::disabled())
    }

    #[test]
    fn test_blocklist_matches() {
        let gate = gate(SecurityLevel::Strict);
        for cmd in [
            "rm -rf /",
            "cd /tmp && RM -RF build",
            "dd if=/dev/zero of=/dev/sda",
            "mkfs.ext4 /dev/sdb1",
            "echo x > /dev/sda",
            "FORMAT C:",
            "del /f important.doc",
        ] {
            assert!(gate.is_dangerous(cmd), "{}", cmd);
        }
        for cmd in ["ls -la", "rm file.txt", "echo hello", "cat /dev/null"] {
            assert!(!gate.is_dangerous(cmd), "{}", cmd);
        }
    }

    #[test]
    fn test_normal_level_enforces_blocklist() {
        assert!(gate(SecurityLevel::Normal).is_dangerous("rm -rf /"));
    }

    #[test]
    fn test_relaxed_never_dangerous() {
        assert!(!gate(SecurityLevel::Relaxed).is_dangerous("rm -rf /"));
    }

    #[test]
    fn test_every_decision_is_audited() {
        let dir = TempDir::new().unwrap();
        let gate = SecurityGate::for_workspace(&SecurityConfig::default(), dir.path());
        gate.is_dangerous("rm -rf /");
        gate.is_dangerous("ls");
        gate.log_tool_call("write", &json!({"file_path": "secret.txt", "content": "hunter2"}));

        let log = std::fs::read_to_string(dir.path().join(".xiaoclaw/audit.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("BLOCKED: rm -rf /"));
        assert!(lines[1].contains("ALLOWED: ls"));
        assert!(lines[2].contains("TOOL: write(content, file_path)"));
        assert!(!log.contains("hunter2"));
    }

    #[test]
    fn test_audit_disabled_in_config() {
        let dir = TempDir::new().unwrap();
        let config = SecurityConfig {
            audit_log: false,
            ..SecurityConfig::default()
        };
        let gate = SecurityGate::for_workspace(&config, dir.path());
        gate.is_dangerous("ls");
        assert!(!dir.path().join(".xiaoclaw/audit.log").exists());
    }

    #[test]
    fn test_user_tool_permissions() {
        let mut config = SecurityConfig::default();
        config.user_tools.insert(
            "guest".to_string(),
            ToolPermissions {
                allow: vec!["read".to_string(), "exec".to_string()],
                deny: vec!["exec".to_string()],
            },
        );
        config.user_tools.insert(
            "locked".to_string(),
            ToolPermissions {
                allow: vec![],
                deny: vec!["*".to_string()],
            },
        );
        let gate = SecurityGate::new(&config, AuditLog::disabled());

        assert!(gate.is_tool_allowed("guest", "read"));
        assert!(!gate.is_tool_allowed("guest", "exec"));
        assert!(!gate.is_tool_allowed("guest", "write"));
        assert!(!gate.is_tool_allowed("locked", "read"));
        assert!(gate.is_tool_allowed("anyone", "exec"));
    }
}
