//! Hook system for the xiaoclaw agent loop.
//!
//! Handlers subscribe to named events and may return a value that
//! short-circuits the default behaviour:
//!
//! - `message_received`: the value becomes the reply; the provider is not called
//! - `before_tool_call`: the value is used as the tool result; the tool is not run
//! - `after_tool_call`: the value replaces the tool result
//!
//! A failing handler is logged and skipped, never propagated into the loop.
//!
//! Besides programmatic handlers, [`RuleHook`] evaluates the config-driven
//! rules from the `hooks` section:
//!
//! ```json
//! {
//!     "hooks": {
//!         "enabled": true,
//!         "before_tool": [
//!             { "action": "log", "tools": ["exec"], "level": "warn" },
//!             { "action": "block", "tools": ["web_fetch"], "message": "Web access disabled" }
//!         ],
//!         "after_tool": [
//!             { "action": "log", "tools": ["*"] }
//!         ],
//!         "on_error": [
//!             { "action": "log", "tools": ["*"], "level": "error" }
//!         ]
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::error::Result;

/// Point in the agent loop a hook fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    MessageReceived,
    BeforeToolCall,
    AfterToolCall,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::MessageReceived => "message_received",
            HookEvent::BeforeToolCall => "before_tool_call",
            HookEvent::AfterToolCall => "after_tool_call",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword context passed to handlers. Fields not relevant to an event are `None`.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub session_id: String,
    pub user_id: Option<String>,
    /// Inbound text (`message_received`).
    pub message: Option<String>,
    /// Tool name (tool events).
    pub tool: Option<String>,
    /// Parsed tool arguments (tool events).
    pub args: Option<Value>,
    /// Tool result (`after_tool_call`).
    pub result: Option<String>,
}

impl HookContext {
    pub fn message(session_id: &str, user_id: &str, message: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: Some(user_id.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn tool(session_id: &str, tool: &str, args: &Value) -> Self {
        Self {
            session_id: session_id.to_string(),
            tool: Some(tool.to_string()),
            args: Some(args.clone()),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: &str) -> Self {
        self.result = Some(result.to_string());
        self
    }
}

/// A hook handler.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handle an event. `Ok(Some(value))` short-circuits.
    async fn handle(&self, event: HookEvent, ctx: &HookContext) -> Result<Option<String>>;
}

/// Registry of handlers per event, run in registration order.
#[derive(Clone, Default)]
pub struct HookManager {
    handlers: HashMap<HookEvent, Vec<Arc<dyn HookHandler>>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the config-driven [`RuleHook`] installed when enabled.
    pub fn from_config(config: &HooksConfig) -> Self {
        let mut manager = Self::new();
        if config.enabled {
            let rules: Arc<dyn HookHandler> = Arc::new(RuleHook::new(config.clone()));
            manager.register(HookEvent::BeforeToolCall, Arc::clone(&rules));
            manager.register(HookEvent::AfterToolCall, rules);
        }
        manager
    }

    pub fn register(&mut self, event: HookEvent, handler: Arc<dyn HookHandler>) {
        self.handlers.entry(event).or_default().push(handler);
    }

    pub fn handler_count(&self, event: HookEvent) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Fire an event. The first handler returning `Some` wins; handler
    /// errors are logged and skipped.
    pub async fn fire(&self, event: HookEvent, ctx: &HookContext) -> Option<String> {
        let handlers = self.handlers.get(&event)?;
        for handler in handlers {
            match handler.handle(event, ctx).await {
                Ok(Some(value)) => {
                    debug!(event = %event, session = %ctx.session_id, "Hook short-circuited");
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(event = %event, session = %ctx.session_id, error = %e, "Hook handler failed");
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Config-driven rules
// ---------------------------------------------------------------------------

/// What a hook rule does when triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    /// Log the event via tracing.
    Log,
    /// Block the tool from executing (`before_tool` only).
    Block,
}

/// A single hook rule that matches tool calls and performs an action.
///
/// Rules are evaluated in order. For `before_tool`, the first `Block` rule
/// that matches wins. `Log` rules always execute (no short-circuit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookRule {
    /// Action to perform.
    pub action: HookAction,
    /// Tool names to match. `["*"]` matches all tools. Empty = match none.
    pub tools: Vec<String>,
    /// Log level for `Log` action (trace/debug/info/warn/error).
    pub level: Option<String>,
    /// Custom message for `Block` action.
    pub message: Option<String>,
}

impl Default for HookRule {
    fn default() -> Self {
        Self {
            action: HookAction::Log,
            tools: vec![],
            level: None,
            message: None,
        }
    }
}

impl HookRule {
    pub fn matches_tool(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t == "*" || t == tool_name)
    }
}

/// Hooks configuration for `config.json`.
///
/// Defaults: `enabled = false`, all rule lists empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Master switch for hooks.
    pub enabled: bool,
    /// Rules evaluated before each tool execution.
    pub before_tool: Vec<HookRule>,
    /// Rules evaluated after each tool execution.
    pub after_tool: Vec<HookRule>,
    /// Rules evaluated when a tool result reports an error.
    pub on_error: Vec<HookRule>,
}

/// Handler evaluating [`HooksConfig`] rules.
pub struct RuleHook {
    config: HooksConfig,
}

impl RuleHook {
    pub fn new(config: HooksConfig) -> Self {
        Self { config }
    }

    fn before_tool(&self, tool: &str, session: &str) -> Option<String> {
        for rule in self.config.before_tool.iter().filter(|r| r.matches_tool(tool)) {
            match rule.action {
                HookAction::Log => log_at(rule.level.as_deref(), "before_tool", tool, session),
                HookAction::Block => {
                    info!(hook = "before_tool", tool = tool, session = session, "Hook: blocking tool");
                    return Some(
                        rule.message
                            .clone()
                            .unwrap_or_else(|| format!("Tool '{}' blocked by hook", tool)),
                    );
                }
            }
        }
        None
    }

    fn after_tool(&self, tool: &str, session: &str, result: &str) {
        for rule in self.config.after_tool.iter().filter(|r| r.matches_tool(tool)) {
            if rule.action == HookAction::Log {
                log_at(rule.level.as_deref(), "after_tool", tool, session);
            }
        }
        if result.starts_with("Error") {
            for rule in self.config.on_error.iter().filter(|r| r.matches_tool(tool)) {
                if rule.action == HookAction::Log {
                    log_at(rule.level.as_deref().or(Some("error")), "on_error", tool, session);
                }
            }
        }
    }
}

#[async_trait]
impl HookHandler for RuleHook {
    async fn handle(&self, event: HookEvent, ctx: &HookContext) -> Result<Option<String>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let tool = ctx.tool.as_deref().unwrap_or_default();
        Ok(match event {
            HookEvent::BeforeToolCall => self.before_tool(tool, &ctx.session_id),
            HookEvent::AfterToolCall => {
                self.after_tool(tool, &ctx.session_id, ctx.result.as_deref().unwrap_or_default());
                None
            }
            HookEvent::MessageReceived => None,
        })
    }
}

fn log_at(level: Option<&str>, hook: &str, tool: &str, session: &str) {
    match level.unwrap_or("info") {
        "error" => error!(hook = hook, tool = tool, session = session, "Hook: tool event"),
        "warn" => warn!(hook = hook, tool = tool, session = session, "Hook: tool event"),
        "debug" => debug!(hook = hook, tool = tool, session = session, "Hook: tool event"),
        "trace" => trace!(hook = hook, tool = tool, session = session, "Hook: tool event"),
        _ => info!(hook = hook, tool = tool, session = session, "Hook: tool event"),
    }
}
