//! xiaoclaw - Lightweight conversational agent runtime

pub mod agent;
pub mod config;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod providers;
pub mod ratelimit;
pub mod security;
pub mod session;
pub mod stats;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, SubagentManager};
pub use config::Config;
pub use error::{Result, XiaoError};
pub use providers::{
    ChatOptions, LLMProvider, LLMResponse, LLMToolCall, OpenAIProvider, StreamEvent,
    ToolDefinition, Usage,
};
pub use session::{Message, Role, Session, SessionManager, ToolCall};
