//! Tool registry for xiaoclaw
//!
//! Maps tool names to implementations, tracks a soft-disabled set and
//! exposes a total dispatch boundary: [`ToolRegistry::call`] always returns
//! a string and never an error.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, XiaoError};
use crate::providers::ToolDefinition;

use super::{FnTool, Tool, ToolContext};

/// Category a tool failure is rendered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    BadArguments,
    PermissionDenied,
    NotFound,
    Other,
}

impl ToolErrorKind {
    /// Classify an error raised by a tool body.
    pub fn classify(err: &XiaoError) -> Self {
        match err {
            XiaoError::InvalidArguments(_) | XiaoError::Json(_) => Self::BadArguments,
            XiaoError::SecurityViolation(_) => Self::PermissionDenied,
            XiaoError::NotFound(_) => Self::NotFound,
            XiaoError::Io(e) => match e.kind() {
                std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
                std::io::ErrorKind::NotFound => Self::NotFound,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

/// Render a tool failure as the string handed back to the LLM.
pub fn render_tool_error(name: &str, err: &XiaoError) -> String {
    let detail = match err {
        XiaoError::InvalidArguments(d)
        | XiaoError::SecurityViolation(d)
        | XiaoError::NotFound(d)
        | XiaoError::Tool(d) => d.clone(),
        XiaoError::Io(e) => e.to_string(),
        other => other.to_string(),
    };
    match ToolErrorKind::classify(err) {
        ToolErrorKind::BadArguments => format!("Error calling {}: bad arguments: {}", name, detail),
        ToolErrorKind::PermissionDenied => {
            format!("Error calling {}: permission denied: {}", name, detail)
        }
        ToolErrorKind::NotFound => format!("Error calling {}: file not found: {}", name, detail),
        ToolErrorKind::Other => format!("Error calling {}: {}: {}", name, err.kind_name(), detail),
    }
}

/// A registry that holds and manages tools.
///
/// Cloning is cheap (tools are shared `Arc`s), which lets the agent snapshot
/// the registry for a tool batch without holding its lock across awaits.
///
/// # Example
///
/// ```rust
/// use xiaoclaw::tools::{ToolContext, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register_fn("echo", "Echo a message", json!({"type": "object"}), |args, _| async move {
///     Ok(args["message"].as_str().unwrap_or_default().to_string())
/// });
///
/// let out = registry.call("echo", json!({"message": "hello"}), &ToolContext::new()).await;
/// assert_eq!(out, "hello");
///
/// let out = registry.call("nope", json!({}), &ToolContext::new()).await;
/// assert!(out.contains("Available: echo"));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    disabled: HashSet<String>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            info!(tool = %name, "Replacing tool");
        } else {
            info!(tool = %name, "Registering tool");
        }
    }

    /// Register a closure as a tool with an explicit schema.
    pub fn register_fn<F, Fut>(&mut self, name: &str, description: &str, parameters: Value, func: F)
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.register(Arc::new(FnTool::new(name, description, parameters, func)));
    }

    /// Get a tool by name (disabled tools included).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool is registered (disabled tools included).
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Soft-disable a tool. Returns false if no such tool is registered.
    pub fn disable(&mut self, name: &str) -> bool {
        if !self.tools.contains_key(name) {
            return false;
        }
        self.disabled.insert(name.to_string());
        true
    }

    /// Re-enable a disabled tool.
    pub fn enable(&mut self, name: &str) -> bool {
        self.disabled.remove(name)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    /// Names of the enabled tools, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .keys()
            .filter(|n| !self.disabled.contains(*n))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Definitions of the enabled tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list_names()
            .into_iter()
            .filter_map(|name| self.tools.get(&name))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Enabled tools in the OpenAI function-calling shape.
    pub fn openai_functions(&self) -> Vec<Value> {
        self.definitions()
            .iter()
            .map(ToolDefinition::to_openai_function)
            .collect()
    }

    /// Number of registered tools (disabled included).
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call. Never fails: unknown and disabled tools and every
    /// error raised by the tool body come back as descriptive strings.
    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!(
                "Error: unknown tool '{}'. Available: {}",
                name,
                self.list_names().join(", ")
            );
        };
        if self.disabled.contains(name) {
            return format!("Error: tool '{}' is disabled", name);
        }

        let start = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(output) => {
                info!(
                    tool = name,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                output
            }
            Err(e) => {
                warn!(
                    tool = name,
                    error = %e,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                render_tool_error(name, &e)
            }
        }
    }
}
