//! Agent module - Core AI agent logic and conversation handling
//!
//! The agent is responsible for:
//!
//! - Admitting inbound messages (rate limit, `message_received` hooks)
//! - Building conversation context with system prompts and history
//! - Calling the LLM provider, buffered or streamed
//! - Executing tool calls concurrently and feeding results back to the LLM
//! - Compacting long sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   caller    │────>│  AgentLoop  │────>│ LLMProvider │
//! │ (CLI, ...)  │     │             │     │  (+ retry)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Session   │     │    Tools    │
//!                     │   Manager   │     │  Registry   │
//!                     └─────────────┘     └─────────────┘
//! ```

pub mod compaction;
mod context;
mod r#loop;
pub mod subagent;
mod think;

pub use compaction::{Compactor, ProviderSummarizer, Summarizer};
pub use context::{ContextBuilder, RuntimeContext, DEFAULT_SYSTEM_PROMPT};
pub use r#loop::{AgentLoop, RunOutcome, RATE_LIMIT_REPLY};
pub use subagent::{
    SubagentInfo, SubagentManager, SubagentStatus, SUBAGENT_SYSTEM_PROMPT, SUBAGENT_USER,
};
pub use think::{strip_think, ThinkFilter};
