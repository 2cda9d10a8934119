//! Context builder for agent conversations
//!
//! Builds the system prompt (base prompt, workspace bootstrap files and a
//! runtime section) and assembles the message array sent on every round.

use std::collections::BTreeMap;

use crate::session::Message;

/// Default system prompt for the xiaoclaw agent
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are xiaoclaw, a lightweight personal AI assistant.

You have access to tools to help accomplish tasks. Use them when needed.

Be concise but helpful. Focus on completing the user's request efficiently."#;

/// Runtime facts appended to the system prompt as a `## Runtime Context` section.
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    /// Names of available tools
    pub available_tools: Vec<String>,
    /// Current timestamp (RFC 3339)
    pub current_time: Option<String>,
    /// Workspace path
    pub workspace: Option<String>,
    /// OS/platform info (e.g. "linux x86_64")
    pub os_info: Option<String>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.available_tools = tools;
        self
    }

    /// Set the current time to now (local time, RFC 3339).
    pub fn with_current_time(mut self) -> Self {
        self.current_time = Some(chrono::Local::now().to_rfc3339());
        self
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    pub fn with_os_info(mut self) -> Self {
        self.os_info = Some(format!(
            "{} {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.available_tools.is_empty()
            && self.current_time.is_none()
            && self.workspace.is_none()
            && self.os_info.is_none()
    }

    /// Render as a markdown section, or `None` when nothing is set.
    ///
    /// ```rust
    /// use xiaoclaw::agent::RuntimeContext;
    ///
    /// let ctx = RuntimeContext::new().with_tools(vec!["read".into(), "exec".into()]);
    /// let rendered = ctx.render().unwrap();
    /// assert!(rendered.starts_with("## Runtime Context"));
    /// assert!(rendered.contains("Available tools: read, exec"));
    /// ```
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        if !self.available_tools.is_empty() {
            parts.push(format!(
                "- Available tools: {}",
                self.available_tools.join(", ")
            ));
        }
        if let Some(ref time) = self.current_time {
            parts.push(format!("- Current time: {}", time));
        }
        if let Some(ref workspace) = self.workspace {
            parts.push(format!("- Workspace: {}", workspace));
        }
        if let Some(ref os) = self.os_info {
            parts.push(format!("- Platform: {}", os));
        }

        Some(format!("## Runtime Context\n\n{}", parts.join("\n")))
    }
}

/// Builder for the system prompt and per-round message array.
///
/// # Example
///
/// ```rust
/// use xiaoclaw::agent::ContextBuilder;
/// use xiaoclaw::session::{Message, Role};
///
/// let builder = ContextBuilder::new().with_system_prompt("You are terse.");
/// let messages = builder.build_messages(vec![Message::user("Hello")]);
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].role, Role::System);
/// assert!(messages[0].content.starts_with("You are terse."));
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    bootstrap: BTreeMap<String, String>,
    runtime_context: Option<RuntimeContext>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            bootstrap: BTreeMap::new(),
            runtime_context: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Add workspace bootstrap files (AGENTS.md, SOUL.md, ...), each rendered
    /// under its own `## {name}` heading.
    pub fn with_bootstrap_files(mut self, files: BTreeMap<String, String>) -> Self {
        self.bootstrap = files;
        self
    }

    /// Add runtime context. An empty context is ignored.
    pub fn with_runtime_context(mut self, ctx: RuntimeContext) -> Self {
        if !ctx.is_empty() {
            self.runtime_context = Some(ctx);
        }
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn build_system_message(&self) -> Message {
        let mut content = self.system_prompt.clone();
        for (name, body) in &self.bootstrap {
            if body.trim().is_empty() {
                continue;
            }
            content.push_str(&format!("\n\n## {}\n\n{}", name, body.trim()));
        }
        if let Some(rendered) = self.runtime_context.as_ref().and_then(RuntimeContext::render) {
            content.push_str("\n\n");
            content.push_str(&rendered);
        }
        Message::system(&content)
    }

    /// One system message followed by `history`.
    pub fn build_messages(&self, history: Vec<Message>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(self.build_system_message());
        messages.extend(history);
        messages
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_default_prompt() {
        let builder = ContextBuilder::default();
        assert!(builder.system_prompt().contains("xiaoclaw"));
        let system = builder.build_system_message();
        assert_eq!(system.role, Role::System);
        assert!(!system.is_compaction_summary());
    }

    #[test]
    fn test_bootstrap_files_rendered_in_order() {
        let mut files = BTreeMap::new();
        files.insert("USER.md".to_string(), "Name: Lin".to_string());
        files.insert("SOUL.md".to_string(), "Be warm.".to_string());
        files.insert("AGENTS.md".to_string(), "   ".to_string());

        let content = ContextBuilder::new()
            .with_bootstrap_files(files)
            .build_system_message()
            .content;
        assert!(!content.contains("## AGENTS.md"));
        let soul = content.find("## SOUL.md\n\nBe warm.").unwrap();
        let user = content.find("## USER.md\n\nName: Lin").unwrap();
        assert!(soul < user);
    }

    #[test]
    fn test_runtime_context() {
        assert!(RuntimeContext::new().render().is_none());

        let ctx = RuntimeContext::new()
            .with_workspace("/srv/ws")
            .with_os_info()
            .with_current_time();
        let content = ContextBuilder::new()
            .with_runtime_context(ctx)
            .build_system_message()
            .content;
        assert!(content.contains("## Runtime Context"));
        assert!(content.contains("- Workspace: /srv/ws"));
        assert!(content.contains("- Platform: "));
        assert!(content.contains("- Current time: "));
    }

    #[test]
    fn test_empty_runtime_context_ignored() {
        let content = ContextBuilder::new()
            .with_runtime_context(RuntimeContext::new())
            .build_system_message()
            .content;
        assert!(!content.contains("Runtime Context"));
    }

    #[test]
    fn test_build_messages_prepends_system() {
        let messages = ContextBuilder::new()
            .build_messages(vec![Message::user("a"), Message::assistant("b")]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[2].content, "b");
    }
}
