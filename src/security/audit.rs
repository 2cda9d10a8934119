//! Audit trail for security-relevant events.
//!
//! Every event is written twice: as a structured `tracing` event carrying
//! `audit = true` (so log pipelines can filter on it) and, when a file sink
//! is configured, as one line of `{workspace}/.xiaoclaw/audit.log`:
//!
//! ```text
//! [2026-01-31 12:00:00] BLOCKED: rm -rf /tmp/x
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::utils::string::truncate_chars;

/// Maximum characters of event detail written to the audit file.
pub const AUDIT_DETAIL_MAX_CHARS: usize = 200;

/// Broad category of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    /// Shell command classification (blocked or allowed).
    ShellSecurity,
    /// Per-user tool permission denial.
    PolicyViolation,
    /// Tool invocation record.
    ToolInvocation,
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShellSecurity => write!(f, "shell_security"),
            Self::PolicyViolation => write!(f, "policy_violation"),
            Self::ToolInvocation => write!(f, "tool_invocation"),
        }
    }
}

/// Severity level for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    /// Informational: action was noted but not harmful.
    Info,
    /// Warning: action was refused for policy reasons.
    Warning,
    /// Critical: a dangerous action was blocked.
    Critical,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Emit a structured audit event via `tracing`.
pub fn log_audit_event(
    category: AuditCategory,
    severity: AuditSeverity,
    event_type: &str,
    detail: &str,
    blocked: bool,
) {
    match severity {
        AuditSeverity::Info => info!(
            audit = true,
            category = %category,
            severity = %severity,
            event_type = event_type,
            detail = detail,
            blocked = blocked,
            "audit event"
        ),
        AuditSeverity::Warning => warn!(
            audit = true,
            category = %category,
            severity = %severity,
            event_type = event_type,
            detail = detail,
            blocked = blocked,
            "audit event"
        ),
        AuditSeverity::Critical => error!(
            audit = true,
            category = %category,
            severity = %severity,
            event_type = event_type,
            detail = detail,
            blocked = blocked,
            "audit event"
        ),
    }
}

/// Append-only audit file.
///
/// Write failures are reported through `tracing` and otherwise ignored:
/// the audit sink never fails the action being audited.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Audit file at `{workspace}/.xiaoclaw/audit.log`.
    pub fn in_workspace(workspace: &Path) -> Self {
        Self::at(workspace.join(".xiaoclaw").join("audit.log"))
    }

    /// Audit file at an explicit path.
    pub fn at(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            lock: Mutex::new(()),
        }
    }

    /// Tracing-only audit (no file).
    pub fn disabled() -> Self {
        Self {
            path: None,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record one event in both sinks.
    pub fn record(
        &self,
        event: &str,
        detail: &str,
        category: AuditCategory,
        severity: AuditSeverity,
        blocked: bool,
    ) {
        log_audit_event(category, severity, event, detail, blocked);

        let Some(path) = &self.path else {
            return;
        };
        let line = format_line(event, detail);
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = append_line(path, &line) {
            warn!(path = %path.display(), error = %e, "Failed to write audit log");
        }
    }
}

/// `[YYYY-MM-DD HH:MM:SS] EVENT: detail` with the detail capped at 200 chars.
pub fn format_line(event: &str, detail: &str) -> String {
    format!(
        "[{}] {}: {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        event,
        truncate_chars(detail, AUDIT_DETAIL_MAX_CHARS)
    )
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_audit_category_display() {
        assert_eq!(AuditCategory::ShellSecurity.to_string(), "shell_security");
        assert_eq!(AuditCategory::PolicyViolation.to_string(), "policy_violation");
        assert_eq!(AuditCategory::ToolInvocation.to_string(), "tool_invocation");
    }

    #[test]
    fn test_audit_severity_display() {
        assert_eq!(AuditSeverity::Info.to_string(), "info");
        assert_eq!(AuditSeverity::Warning.to_string(), "warning");
        assert_eq!(AuditSeverity::Critical.to_string(), "critical");
    }

    #[test]
    fn test_format_line_truncates_detail() {
        let line = format_line("ALLOWED", &"x".repeat(500));
        assert!(line.starts_with('['));
        assert!(line.contains("] ALLOWED: "));
        let detail = line.trim_end().split(": ").nth(1).unwrap();
        assert_eq!(detail.len(), AUDIT_DETAIL_MAX_CHARS);
    }

    #[test]
    fn test_record_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::in_workspace(dir.path());
        log.record("BLOCKED", "rm -rf /", AuditCategory::ShellSecurity, AuditSeverity::Critical, true);
        log.record("TOOL", "read(file_path)", AuditCategory::ToolInvocation, AuditSeverity::Info, false);

        let content = std::fs::read_to_string(dir.path().join(".xiaoclaw/audit.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("BLOCKED: rm -rf /"));
        assert!(lines[1].ends_with("TOOL: read(file_path)"));
    }

    #[test]
    fn test_unwritable_sink_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let log = AuditLog::at(blocker.join("nested").join("audit.log"));
        log.record("ALLOWED", "ls", AuditCategory::ShellSecurity, AuditSeverity::Info, false);
    }

    #[test]
    fn test_disabled_sink() {
        let log = AuditLog::disabled();
        assert!(log.path().is_none());
        log.record("ALLOWED", "ls", AuditCategory::ShellSecurity, AuditSeverity::Info, false);
    }
}
