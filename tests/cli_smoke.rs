//! CLI smoke tests - verify the commands that work without API keys.
//!
//! These tests run the compiled binary against a throwaway home directory
//! and verify exit codes and output. No API keys or network access required.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Helper: run xiaoclaw with `home` as $HOME and return (exit_code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_xiaoclaw");
    let output = Command::new(bin)
        .args(args)
        .env("HOME", home)
        .env("XIAOCLAW_WORKSPACE", home.join("workspace"))
        .env("RUST_LOG", "off")
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_BASE_URL")
        .env_remove("XIAOCLAW_MODEL")
        .env_remove("XIAOCLAW_STREAMING")
        .output()
        .expect("failed to execute xiaoclaw binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("xiaoclaw"));
}

#[test]
fn cli_version_command() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// Tools
// ============================================================================

#[test]
fn cli_tools_lists_builtins() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["tools"]);
    assert_eq!(code, 0);
    for name in ["read", "exec", "grep", "web_fetch", "memory_save"] {
        assert!(stdout.contains(name), "missing {} in:\n{}", name, stdout);
    }
}

// ============================================================================
// Chat (offline) & Sessions
// ============================================================================

#[test]
fn cli_chat_offline_one_shot() {
    let home = TempDir::new().unwrap();
    let (code, stdout, stderr) = run_cli(home.path(), &["chat", "-m", "hello", "--no-stream"]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("offline mode"), "got: {}", stdout);
    assert!(stderr.contains("no LLM provider configured"));
}

#[test]
fn cli_chat_offline_streamed() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["chat", "-m", "version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains(&format!("xiaoclaw v{}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn cli_sessions_list_and_delete() {
    let home = TempDir::new().unwrap();

    let (code, stdout, _stderr) = run_cli(home.path(), &["sessions", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No sessions"));

    run_cli(home.path(), &["chat", "-m", "hi", "--session", "smoke", "--no-stream"]);
    let (code, stdout, _stderr) = run_cli(home.path(), &["sessions", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("smoke"), "got: {}", stdout);

    let (code, stdout, _stderr) = run_cli(home.path(), &["sessions", "delete", "smoke"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Deleted session smoke"));

    let (_code, stdout, _stderr) = run_cli(home.path(), &["sessions", "delete", "smoke"]);
    assert!(stdout.contains("No session named smoke"));
}

#[test]
fn cli_unknown_command_fails() {
    let home = TempDir::new().unwrap();
    let (code, _stdout, stderr) = run_cli(home.path(), &["frobnicate"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error"));
}
