//! Tools module - Tool definitions and execution for LLM function calling
//!
//! This module provides the infrastructure for defining and executing tools
//! that the LLM can call during a conversation.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution context (workspace, session, user)
//! - `ToolRegistry`: Name-keyed registry with a total dispatch boundary
//!
//! # Built-in Tools
//!
//! - `read`, `write`, `edit`, `list_dir`: [`filesystem`]
//! - `exec`: [`shell`], gated by the [`SecurityGate`]
//! - `find_files`, `grep`: [`search`]
//! - `web_search`, `web_fetch`: [`web`]
//! - `memory_search`, `memory_get`, `memory_save`: [`memory`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xiaoclaw::config::Config;
//! use xiaoclaw::security::{AuditLog, SecurityGate};
//! use xiaoclaw::tools::builtin_registry;
//!
//! let config = Config::default();
//! let gate = Arc::new(SecurityGate::new(&config.security, AuditLog::disabled()));
//! let registry = builtin_registry(&config, gate, None);
//! assert!(registry.has("exec"));
//! assert!(registry.list_names().contains(&"memory_save".to_string()));
//! ```

pub mod filesystem;
pub mod memory;
mod registry;
pub mod search;
pub mod shell;
mod types;
pub mod web;

pub use registry::{render_tool_error, ToolErrorKind, ToolRegistry};
pub use types::{FnTool, Tool, ToolContext};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::memory::MemoryManager;
use crate::security::SecurityGate;

/// Build a registry holding every built-in tool, with the tools listed in
/// `tools.disabled` soft-disabled.
pub fn builtin_registry(
    config: &Config,
    gate: Arc<SecurityGate>,
    memory: Option<Arc<MemoryManager>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(filesystem::ReadTool));
    registry.register(Arc::new(filesystem::WriteTool));
    registry.register(Arc::new(filesystem::EditTool));
    registry.register(Arc::new(filesystem::ListDirTool));
    registry.register(Arc::new(
        shell::ExecTool::new(gate).with_timeout(Duration::from_secs(config.tools.exec_timeout_secs)),
    ));
    registry.register(Arc::new(search::FindFilesTool));
    registry.register(Arc::new(search::GrepTool));
    registry.register(Arc::new(web::WebSearchTool::new()));
    registry.register(Arc::new(web::WebFetchTool::new()));
    registry.register(Arc::new(memory::MemorySearchTool::new(memory.clone())));
    registry.register(Arc::new(memory::MemoryGetTool::new(memory.clone())));
    registry.register(Arc::new(memory::MemorySaveTool::new(memory)));

    for name in &config.tools.disabled {
        if !registry.disable(name) {
            warn!(tool = %name, "Cannot disable unknown tool");
        }
    }
    registry
}
