//! Session types for xiaoclaw
//!
//! Defines messages, roles and tool calls, plus the in-memory side of a
//! [`Session`]: token accounting and the token-budgeted context window.
//! Durable storage lives in [`super::jsonl`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

use super::jsonl;

/// Fixed per-message overhead added to every token estimate.
pub const MESSAGE_TOKEN_OVERHEAD: usize = 4;

/// Approximate token cost of a piece of text (roughly three characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 3
}

/// A conversation session: an ordered, append-only log of messages.
///
/// Sessions created with [`Session::with_file`] persist every appended
/// message as one JSONL line; [`Session::save`] rewrites the whole file.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier for this session
    pub id: String,
    /// Ordered list of messages in this conversation
    pub messages: Vec<Message>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last modified
    pub updated_at: DateTime<Utc>,
    path: Option<PathBuf>,
}

impl Session {
    /// Create a new in-memory session (nothing is written to disk).
    ///
    /// # Example
    /// ```
    /// use xiaoclaw::session::Session;
    ///
    /// let session = Session::new("chat123");
    /// assert!(session.messages.is_empty());
    /// assert_eq!(session.token_count(), 0);
    /// ```
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            path: None,
        }
    }

    /// Create a new session backed by a JSONL file at `path`.
    ///
    /// The file is created lazily on the first append or save.
    pub fn with_file(id: &str, path: PathBuf) -> Self {
        let mut session = Self::new(id);
        session.path = Some(path);
        session
    }

    /// Load a session from its JSONL file.
    ///
    /// Malformed lines are skipped with a warning so a partially written
    /// trailing line never makes a session unreadable.
    pub async fn load(id: &str, path: PathBuf) -> Result<Self> {
        let contents = jsonl::read_file(&path).await?;
        let now = Utc::now();
        let (created_at, updated_at) = match &contents.meta {
            Some(meta) => (meta.created_at, meta.updated_at),
            None => (now, now),
        };
        Ok(Self {
            id: id.to_string(),
            messages: contents.messages,
            created_at,
            updated_at,
            path: Some(path),
        })
    }

    /// Path of the backing file, if this session is persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a message, persist it and bump `updated_at`.
    ///
    /// # Example
    /// ```
    /// use xiaoclaw::session::{Message, Session};
    ///
    /// # tokio_test::block_on(async {
    /// let mut session = Session::new("test");
    /// session.add_message(Message::user("Hello!")).await.unwrap();
    /// assert_eq!(session.messages.len(), 1);
    /// # });
    /// ```
    pub async fn add_message(&mut self, message: Message) -> Result<&Message> {
        self.updated_at = Utc::now();
        if let Some(path) = &self.path {
            jsonl::append_message(path, &self.meta(), &message).await?;
        }
        self.messages.push(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Rewrite the whole file: one metadata line followed by every message.
    ///
    /// No-op for in-memory sessions.
    pub async fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            jsonl::write_all(path, &self.meta(), &self.messages).await?;
        }
        Ok(())
    }

    /// Replace the message log wholesale. Used only by compaction.
    pub(crate) fn rewrite(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.updated_at = Utc::now();
    }

    /// Approximate token cost of the whole log. Monotonic under append.
    pub fn token_count(&self) -> usize {
        self.messages.iter().map(Message::token_cost).sum()
    }

    /// Project the most recent messages that fit in `max_tokens`.
    ///
    /// Walks from newest to oldest and stops before the budget would be
    /// exceeded, except that the newest message is always included. The
    /// window never opens on a `tool` result whose requesting assistant
    /// message fell outside it: such orphans are dropped, or when nothing
    /// else would remain, the window is widened back to the assistant.
    pub fn context_window(&self, max_tokens: usize) -> Vec<Message> {
        let len = self.messages.len();
        if len == 0 {
            return Vec::new();
        }

        let mut start = len;
        let mut tokens = 0usize;
        for (idx, msg) in self.messages.iter().enumerate().rev() {
            let cost = msg.token_cost();
            if tokens + cost > max_tokens && start < len {
                break;
            }
            tokens += cost;
            start = idx;
        }

        let mut first = start;
        while first < len && self.messages[first].role == Role::Tool {
            first += 1;
        }
        if first == len {
            first = start;
            while first > 0 && self.messages[first].role == Role::Tool {
                first -= 1;
            }
        }

        self.messages[first..].to_vec()
    }

    /// Number of messages in this session.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session is empty (no messages).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message in this session, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn meta(&self) -> SessionMeta {
        SessionMeta {
            meta: true,
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// First line of a persisted session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Always `true`; distinguishes the record from a message line
    #[serde(rename = "_meta")]
    pub meta: bool,
    #[serde(default)]
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content (empty for an assistant message that only calls tools)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// When the message was appended. Compaction summaries carry the Unix epoch.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message answers (tool results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that produced this result (tool results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a new user message.
    ///
    /// ```
    /// use xiaoclaw::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result answering `tool_call_id`.
    ///
    /// ```
    /// use xiaoclaw::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_123", "read", "file contents");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    /// assert_eq!(msg.name.as_deref(), Some("read"));
    /// ```
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg.name = Some(name.to_string());
        msg
    }

    /// Create an assistant message carrying the raw tool-call envelope.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a compaction summary: a system message tagged with the epoch timestamp.
    pub fn compaction_summary(content: &str) -> Self {
        let mut msg = Self::with_role(Role::System, content);
        msg.timestamp = DateTime::<Utc>::UNIX_EPOCH;
        msg
    }

    /// Whether this message was produced by compaction.
    pub fn is_compaction_summary(&self) -> bool {
        self.role == Role::System && self.timestamp == DateTime::<Utc>::UNIX_EPOCH
    }

    /// Check if this message requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }

    /// Approximate token cost: content plus tool-call envelope plus overhead.
    pub fn token_cost(&self) -> usize {
        let calls: usize = self
            .tool_calls
            .iter()
            .flatten()
            .map(|tc| estimate_tokens(&tc.name) + estimate_tokens(&tc.arguments))
            .sum();
        estimate_tokens(&self.content) + calls + MESSAGE_TOKEN_OVERHEAD
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt or compaction summary
    System,
    /// Result from a tool execution
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}
