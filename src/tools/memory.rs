//! Memory tools for xiaoclaw
//!
//! Expose the workspace [`MemoryManager`] to the LLM. When no memory store
//! is configured every tool answers `Error: memory not configured`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, XiaoError};
use crate::memory::{MemoryManager, DEFAULT_SEARCH_RESULTS};
use crate::utils::string::truncate_chars;

use super::types::{required_str, str_alias};
use super::{Tool, ToolContext};

const NOT_CONFIGURED: &str = "Error: memory not configured";

/// Output cap shared by `memory_search` and `memory_get`.
pub const MEMORY_OUTPUT_MAX_CHARS: usize = 10_000;

/// Search memory files by keyword.
pub struct MemorySearchTool {
    memory: Option<Arc<MemoryManager>>,
}

impl MemorySearchTool {
    pub fn new(memory: Option<Arc<MemoryManager>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search MEMORY.md and daily memory files for lines matching keywords"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Keywords to search for" },
                "max_results": { "type": "integer", "description": "Maximum hits (default: 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let Some(memory) = &self.memory else {
            return Ok(NOT_CONFIGURED.to_string());
        };
        let query = required_str(&args, "query")?;
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, DEFAULT_SEARCH_RESULTS))
            .unwrap_or(DEFAULT_SEARCH_RESULTS);

        let hits = memory.search(query, max_results).await?;
        if hits.is_empty() {
            return Ok("No results found".to_string());
        }
        let joined = hits
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(truncate_chars(&joined, MEMORY_OUTPUT_MAX_CHARS))
    }
}

/// Read a line range from a memory file.
pub struct MemoryGetTool {
    memory: Option<Arc<MemoryManager>>,
}

impl MemoryGetTool {
    pub fn new(memory: Option<Arc<MemoryManager>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Read specific lines from a memory file (path relative to the workspace)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "e.g. MEMORY.md or memory/2026-01-31.md" },
                "start_line": { "type": "integer", "description": "First line, 1-based (default: 1)" },
                "end_line": { "type": "integer", "description": "Last line, inclusive (default: end of file)" }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let Some(memory) = &self.memory else {
            return Ok(NOT_CONFIGURED.to_string());
        };
        let file_path = str_alias(&args, &["file_path", "path"])?;
        let line = |key: &str, default: usize| {
            args.get(key)
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(default)
        };

        match memory
            .get(file_path, line("start_line", 1), line("end_line", 0))
            .await
        {
            Ok(text) => Ok(truncate_chars(&text, MEMORY_OUTPUT_MAX_CHARS)),
            Err(XiaoError::NotFound(_)) => Ok(format!("Error: file not found: {}", file_path)),
            Err(e) => Err(e),
        }
    }
}

/// Save a note to today's daily file or to MEMORY.md.
pub struct MemorySaveTool {
    memory: Option<Arc<MemoryManager>>,
}

impl MemorySaveTool {
    pub fn new(memory: Option<Arc<MemoryManager>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemorySaveTool {
    fn name(&self) -> &str {
        "memory_save"
    }

    fn description(&self) -> &str {
        "Save a note to memory (today's daily file by default, or MEMORY.md)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text to remember" },
                "daily": { "type": "boolean", "description": "Save to today's daily file (default: true) instead of MEMORY.md" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let Some(memory) = &self.memory else {
            return Ok(NOT_CONFIGURED.to_string());
        };
        let content = required_str(&args, "content")?;
        let daily = args.get("daily").and_then(Value::as_bool).unwrap_or(true);

        let saved = if daily {
            memory
                .append_daily(content, None)
                .await
                .map(|date| format!("Saved to memory/{}.md", date))
        } else {
            memory
                .append_memory(content)
                .await
                .map(|_| "Saved to MEMORY.md".to_string())
        };
        Ok(saved.unwrap_or_else(|e| format!("Error saving memory: {}", e)))
    }
}
