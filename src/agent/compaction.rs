//! Context compaction for conversation history.
//!
//! When a session's token count exceeds the configured threshold, everything
//! but the most recent messages is replaced by a single summary message.
//! The cut point is moved back so an assistant `tool_calls` message is never
//! separated from its `tool` results, and summaries left by earlier
//! compactions are carried over verbatim instead of being summarized again.
//!
//! The doomed messages are handed to the memory store first so anything
//! marked important survives on disk.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::memory::MemoryManager;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, Role, Session};
use crate::utils::string::truncate_chars;

/// Messages kept verbatim at the end of the log by default.
pub const DEFAULT_KEEP_RECENT: usize = 4;

/// Messages quoted by the fallback summary.
const FALLBACK_MESSAGES: usize = 10;

/// Characters of each message quoted by the fallback summary.
const FALLBACK_CHARS: usize = 100;

const SUMMARY_HEADER: &str = "[Conversation Summary]";

const SUMMARIZE_PROMPT: &str = "Summarize the following conversation concisely. \
Keep facts, decisions, open tasks and anything the user asked to remember.";

/// Produces a summary of a run of messages.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Summarizer backed by the configured LLM provider.
pub struct ProviderSummarizer {
    provider: Arc<dyn LLMProvider>,
    model: Option<String>,
    max_tokens: u32,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            model: None,
            max_tokens: 500,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let transcript: String = messages
            .iter()
            .map(|m| format!("{}: {}\n", m.role, m.content))
            .collect();
        let request = vec![Message::system(SUMMARIZE_PROMPT), Message::user(&transcript)];
        let response = self
            .provider
            .chat(
                request,
                vec![],
                self.model.as_deref(),
                ChatOptions::new().with_max_tokens(self.max_tokens),
            )
            .await?;
        Ok(response.content.trim().to_string())
    }
}

/// Naive summary: the first 100 characters of up to the last 10 messages.
pub fn fallback_summary(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(FALLBACK_MESSAGES);
    messages[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role, truncate_chars(&m.content, FALLBACK_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index at which the kept tail begins, or `None` when nothing would be
/// compacted. Never lands on a `tool` result.
pub fn compaction_cut(messages: &[Message], keep_recent: usize) -> Option<usize> {
    if messages.len() <= keep_recent {
        return None;
    }
    let mut cut = messages.len() - keep_recent;
    while cut > 0 && messages[cut].role == Role::Tool {
        cut -= 1;
    }
    (cut > 0).then_some(cut)
}

/// Threshold-triggered history compactor.
pub struct Compactor {
    keep_recent: usize,
    threshold: usize,
    summarizer: Option<Arc<dyn Summarizer>>,
    memory: Option<Arc<MemoryManager>>,
}

impl Compactor {
    pub fn new(threshold: usize) -> Self {
        Self {
            keep_recent: DEFAULT_KEEP_RECENT,
            threshold,
            summarizer: None,
            memory: None,
        }
    }

    pub fn with_keep_recent(mut self, keep_recent: usize) -> Self {
        self.keep_recent = keep_recent;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_memory(mut self, memory: Arc<MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn needs_compaction(&self, session: &Session) -> bool {
        session.token_count() > self.threshold
    }

    /// Compact when over the threshold. Returns whether the log changed.
    pub async fn maybe_compact(&self, session: &mut Session) -> Result<bool> {
        if !self.needs_compaction(session) {
            return Ok(false);
        }
        self.compact(session).await
    }

    /// Replace everything before the kept tail with one summary message and
    /// persist the result. A session of `keep_recent` messages or fewer is
    /// left untouched.
    pub async fn compact(&self, session: &mut Session) -> Result<bool> {
        let Some(cut) = compaction_cut(&session.messages, self.keep_recent) else {
            return Ok(false);
        };

        let (prior, doomed): (Vec<Message>, Vec<Message>) = session.messages[..cut]
            .iter()
            .cloned()
            .partition(Message::is_compaction_summary);
        if doomed.is_empty() {
            return Ok(false);
        }

        let summary = self.summarize(&doomed).await;

        if let Some(memory) = &self.memory {
            if let Err(e) = memory.flush_important(&doomed, &summary).await {
                warn!(session = %session.id, error = %e, "Failed to flush memory before compaction");
            }
        }

        let before = session.message_count();
        let mut compacted = prior;
        compacted.push(Message::compaction_summary(&format!(
            "{}\n{}",
            SUMMARY_HEADER, summary
        )));
        compacted.extend(session.messages[cut..].iter().cloned());
        session.rewrite(compacted);
        session.save().await?;

        info!(
            session = %session.id,
            before = before,
            after = session.message_count(),
            tokens = session.token_count(),
            "Compacted session"
        );
        Ok(true)
    }

    async fn summarize(&self, doomed: &[Message]) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(doomed).await {
                Ok(s) if !s.trim().is_empty() => return s,
                Ok(_) => warn!("Summarizer returned an empty summary, using fallback"),
                Err(e) => warn!(error = %e, "Summarizer failed, using fallback"),
            }
        }
        fallback_summary(doomed)
    }
}
