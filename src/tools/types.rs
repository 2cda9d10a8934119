//! Tool types for xiaoclaw
//!
//! Defines the `Tool` trait every tool implements, the `ToolContext` passed
//! into each execution and `FnTool`, a closure-backed tool for ad-hoc
//! registration.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::expand_home;
use crate::error::Result;

/// Trait that all tools must implement.
///
/// Tools are functions the LLM can call to read files, run commands or
/// reach external services. Expected failures should come back as
/// descriptive `Ok` strings; an `Err` is caught by the registry and
/// rendered as a categorised error string.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use xiaoclaw::error::Result;
/// use xiaoclaw::tools::{Tool, ToolContext};
///
/// struct Ping;
///
/// #[async_trait]
/// impl Tool for Ping {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Answers pong" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({"type": "object", "properties": {}})
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
///         Ok("pong".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the LLM uses to request this tool.
    fn name(&self) -> &str;

    /// Description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The workspace directory relative paths resolve against
    pub workspace: Option<String>,
    /// Session the call belongs to
    pub session_id: Option<String>,
    /// User who triggered the call
    pub user_id: Option<String>,
}

impl ToolContext {
    /// Create a new empty tool context.
    ///
    /// ```
    /// use xiaoclaw::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_workspace("/srv/ws");
    /// assert_eq!(ctx.workspace.as_deref(), Some("/srv/ws"));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace directory.
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    /// Set the session and user the call belongs to.
    pub fn with_session(mut self, session_id: &str, user_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Resolve a tool-supplied path: `~` expands to the home directory,
    /// relative paths join onto the workspace.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            return expanded;
        }
        match &self.workspace {
            Some(ws) => expand_home(ws).join(expanded),
            None => expanded,
        }
    }

    /// Workspace directory, or the current directory when unset.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

type BoxedToolFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;
type ToolFn = dyn Fn(Value, ToolContext) -> BoxedToolFuture + Send + Sync;

/// A tool backed by a closure, with an explicit schema.
///
/// ```
/// use xiaoclaw::tools::{FnTool, Tool};
///
/// let tool = FnTool::new(
///     "echo",
///     "Echo the message back",
///     serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}}),
///     |args, _ctx| async move {
///         Ok(args["message"].as_str().unwrap_or_default().to_string())
///     },
/// );
/// assert_eq!(tool.name(), "echo");
/// ```
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    func: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(name: &str, description: &str, parameters: Value, func: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            func: Arc::new(move |args, ctx| Box::pin(func(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        (self.func)(args, ctx.clone()).await
    }
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        crate::error::XiaoError::InvalidArguments(format!("missing required argument '{}'", key))
    })
}

/// Read a string argument accepting any of several names.
pub(crate) fn str_alias<'a>(args: &'a Value, keys: &[&str]) -> Result<&'a str> {
    keys.iter()
        .find_map(|k| args.get(*k).and_then(Value::as_str))
        .ok_or_else(|| {
            crate::error::XiaoError::InvalidArguments(format!(
                "missing required argument '{}'",
                keys.first().copied().unwrap_or_default()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_path_relative_joins_workspace() {
        let ctx = ToolContext::new().with_workspace("/srv/ws");
        assert_eq!(ctx.resolve_path("notes/a.md"), PathBuf::from("/srv/ws/notes/a.md"));
        assert_eq!(ctx.resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_resolve_path_without_workspace() {
        let ctx = ToolContext::new();
        assert_eq!(ctx.resolve_path("a.txt"), PathBuf::from("a.txt"));
        assert_eq!(ctx.workspace_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_with_session() {
        let ctx = ToolContext::new().with_session("s1", "alice");
        assert_eq!(ctx.session_id.as_deref(), Some("s1"));
        assert_eq!(ctx.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_argument_helpers() {
        let args = json!({"path": "x", "n": 3});
        assert_eq!(required_str(&args, "path").unwrap(), "x");
        assert!(required_str(&args, "n").is_err());
        assert_eq!(str_alias(&args, &["file_path", "path"]).unwrap(), "x");
        let err = str_alias(&args, &["file_path"]).unwrap_err();
        assert!(err.to_string().contains("file_path"));
    }

    #[tokio::test]
    async fn test_fn_tool_executes_closure() {
        let tool = FnTool::new("add", "Add", json!({"type": "object"}), |args, _ctx| async move {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok((a + b).to_string())
        });
        let out = tool
            .execute(json!({"a": 2, "b": 3}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out, "5");
        assert_eq!(tool.parameters()["type"], "object");
    }
}
