//! Shell execution tool for xiaoclaw
//!
//! Commands run through `sh -c` inside the workspace directory, after the
//! [`SecurityGate`] has cleared them, with a hard wall-clock timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::Result;
use crate::security::SecurityGate;
use crate::utils::string::truncate_chars;

use super::types::required_str;
use super::{Tool, ToolContext};

/// Maximum characters of combined output returned to the LLM.
pub const EXEC_MAX_CHARS: usize = 5_000;

/// Default subprocess timeout in seconds.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;

/// Tool for running shell commands.
pub struct ExecTool {
    gate: Arc<SecurityGate>,
    timeout: Duration,
}

impl ExecTool {
    pub fn new(gate: Arc<SecurityGate>) -> Self {
        Self {
            gate,
            timeout: Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let command = required_str(&args, "command")?;

        if self.gate.is_dangerous(command) {
            return Ok("Blocked: dangerous command".to_string());
        }

        let workdir = ctx.workspace_dir();
        debug!(command = command, workdir = %workdir.display(), "Running shell command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(command = command, "Shell command timed out");
                return Ok(format!(
                    "Error: command timed out ({}s)",
                    self.timeout.as_secs()
                ));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim();
        if text.is_empty() {
            return Ok("(no output)".to_string());
        }
        Ok(truncate_chars(text, EXEC_MAX_CHARS))
    }
}
