//! File search tools for xiaoclaw
//!
//! `find_files` matches glob patterns and `grep` runs a case-insensitive
//! regex over text files. Both skip VCS metadata, caches and dependency
//! directories and report paths relative to the search root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};

use crate::error::{Result, XiaoError};
use crate::utils::string::truncate_chars;

use super::types::required_str;
use super::{Tool, ToolContext};

/// Maximum paths returned by `find_files`.
pub const FIND_MAX_RESULTS: usize = 50;

/// Default matches returned by `grep`.
pub const GREP_DEFAULT_MAX_RESULTS: usize = 20;

/// Hard ceiling on `max_results`, whatever the model asks for.
pub const GREP_MAX_RESULTS: usize = 100;

/// Total `grep` output is cut to this many characters.
pub const GREP_OUTPUT_MAX_CHARS: usize = 10_000;

/// Matched lines are cut to this many characters.
const GREP_LINE_MAX_CHARS: usize = 120;

const SKIPPED_DIRS: &[&str] = &[".git", "__pycache__", "venv", "node_modules"];

const TEXT_EXTENSIONS: &[&str] = &[
    "py", "md", "txt", "json", "yaml", "yml", "toml", "cfg", "ini", "sh", "js", "ts", "html",
    "css", "xml", "csv", "rs",
];

fn is_skipped(rel: &Path) -> bool {
    rel.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        SKIPPED_DIRS.iter().any(|s| part.contains(s))
    })
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Tool for finding files by glob pattern.
pub struct FindFilesTool;

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (searched recursively)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern, e.g. *.rs or src/**/mod.rs" },
                "path": { "type": "string", "description": "Directory to search (default: workspace)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let pattern = required_str(&args, "pattern")?.to_string();
        let root = ctx.resolve_path(args.get("path").and_then(Value::as_str).unwrap_or("."));
        if !root.exists() {
            return Ok(format!("Error: not found: {}", root.display()));
        }

        let base = glob::Pattern::escape(&root.to_string_lossy());
        let full = if pattern.contains("**") {
            format!("{}/{}", base, pattern)
        } else {
            format!("{}/**/{}", base, pattern)
        };

        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let paths = glob::glob(&full)
                .map_err(|e| XiaoError::InvalidArguments(format!("invalid glob pattern: {}", e)))?;
            let mut found: Vec<String> = paths
                .filter_map(|entry| entry.ok())
                .map(|p| relative_to(&p, &root))
                .filter(|rel| !is_skipped(rel))
                .map(|rel| rel.to_string_lossy().to_string())
                .take(FIND_MAX_RESULTS)
                .collect();
            found.sort();
            Ok(found)
        })
        .await
        .map_err(|e| XiaoError::Tool(format!("search task failed: {}", e)))??;

        if matches.is_empty() {
            return Ok(format!("No files matching '{}'", pattern));
        }
        Ok(matches.join("\n"))
    }
}

/// Tool for searching file contents with a regex.
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a case-insensitive regular expression"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": { "type": "string", "description": "File or directory to search (default: workspace)" },
                "max_results": { "type": "integer", "description": "Maximum matching lines (default: 20)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let pattern = required_str(&args, "pattern")?.to_string();
        let root = ctx.resolve_path(args.get("path").and_then(Value::as_str).unwrap_or("."));
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, GREP_MAX_RESULTS))
            .unwrap_or(GREP_DEFAULT_MAX_RESULTS);

        if !root.exists() {
            return Ok(format!("Error: not found: {}", root.display()));
        }
        let regex = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(r) => r,
            Err(e) => return Ok(format!("Error: invalid regex: {}", e)),
        };

        let hits = tokio::task::spawn_blocking(move || grep_path(&root, &regex, max_results))
            .await
            .map_err(|e| XiaoError::Tool(format!("search task failed: {}", e)))?;

        if hits.is_empty() {
            return Ok(format!("No matches for '{}'", pattern));
        }
        Ok(truncate_chars(&hits.join("\n"), GREP_OUTPUT_MAX_CHARS))
    }
}

fn grep_path(root: &Path, regex: &Regex, max_results: usize) -> Vec<String> {
    let mut hits = Vec::new();
    if root.is_file() {
        let base = root.parent().unwrap_or(root);
        grep_file(root, base, regex, max_results, &mut hits);
        return hits;
    }

    let mut files = Vec::new();
    collect_text_files(root, root, &mut files);
    files.sort();
    for file in files {
        if hits.len() >= max_results {
            break;
        }
        grep_file(&file, root, regex, max_results, &mut hits);
    }
    hits
}

fn collect_text_files(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if is_skipped(&relative_to(&path, root)) {
            continue;
        }
        if path.is_dir() {
            collect_text_files(&path, root, out);
        } else if is_text_file(&path) {
            out.push(path);
        }
    }
}

fn grep_file(file: &Path, root: &Path, regex: &Regex, max_results: usize, hits: &mut Vec<String>) {
    let Ok(bytes) = std::fs::read(file) else {
        return;
    };
    let text = String::from_utf8_lossy(&bytes);
    let rel = relative_to(file, root);
    for (i, line) in text.lines().enumerate() {
        if hits.len() >= max_results {
            return;
        }
        if regex.is_match(line) {
            hits.push(format!(
                "{}:{}: {}",
                rel.display(),
                i + 1,
                truncate_chars(line.trim(), GREP_LINE_MAX_CHARS)
            ));
        }
    }
}
