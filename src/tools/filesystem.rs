//! Filesystem tools for xiaoclaw
//!
//! Reading, writing, editing and listing files. Paths may be absolute,
//! `~`-prefixed or relative to the workspace in the tool context.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::utils::string::truncate_chars;

use super::types::{required_str, str_alias};
use super::{Tool, ToolContext};

/// Maximum characters returned by `read`.
pub const READ_MAX_CHARS: usize = 10_000;

fn path_schema(extra: Value) -> Value {
    let mut properties = json!({
        "file_path": {
            "type": "string",
            "description": "Path to the file (absolute, ~/..., or relative to the workspace)"
        }
    });
    if let (Some(base), Some(more)) = (properties.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            base.insert(k.clone(), v.clone());
        }
    }
    properties
}

/// Tool for reading file contents (first 10,000 characters).
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": path_schema(json!({})),
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = ctx.resolve_path(str_alias(&args, &["file_path", "path"])?);
        if !path.exists() {
            return Ok(format!("Error: not found: {}", path.display()));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(truncate_chars(&content, READ_MAX_CHARS))
    }
}

/// Tool for writing a file, creating parent directories as needed.
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and parent directories) if necessary"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": path_schema(json!({
                "content": { "type": "string", "description": "Content to write" }
            })),
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = ctx.resolve_path(str_alias(&args, &["file_path", "path"])?);
        let content = required_str(&args, "content")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&path, content).await?;
        Ok(format!("Written: {}", path.display()))
    }
}

/// Tool for replacing the first occurrence of a string in a file.
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace the first occurrence of old_string with new_string in a file"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": path_schema(json!({
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" }
            })),
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = ctx.resolve_path(str_alias(&args, &["file_path", "path"])?);
        let old_string = required_str(&args, "old_string")?;
        let new_string = args.get("new_string").and_then(Value::as_str).unwrap_or("");

        if !path.exists() {
            return Ok(format!("Error: not found: {}", path.display()));
        }
        let text = tokio::fs::read_to_string(&path).await?;
        if old_string.is_empty() || !text.contains(old_string) {
            return Ok("Error: old_string not found in file".to_string());
        }
        tokio::fs::write(&path, text.replacen(old_string, new_string, 1)).await?;
        Ok(format!("Edited: {}", path.display()))
    }
}

/// Tool for listing a directory (dotfiles skipped, entries sorted).
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files and directories with their sizes"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (default: workspace)" }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = ctx.resolve_path(raw);
        if !path.exists() {
            return Ok(format!("Error: not found: {}", path.display()));
        }
        if !path.is_dir() {
            return Ok(format!("Error: not a directory: {}", path.display()));
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            entries.push((name, meta.is_dir(), meta.len()));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        if entries.is_empty() {
            return Ok("(empty directory)".to_string());
        }
        let listing = entries
            .into_iter()
            .map(|(name, is_dir, size)| {
                if is_dir {
                    format!("{}/", name)
                } else {
                    format!("{} ({})", name, format_size(size))
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(truncate_chars(&listing, READ_MAX_CHARS))
    }
}

/// Human-readable size: whole B, KB or MB.
pub fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{}KB", size / 1024)
    } else {
        format!("{}MB", size / (1024 * 1024))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext::new().with_workspace(&dir.path().to_string_lossy())
    }

    #[tokio::test]
    async fn test_write_then_read_relative() {
        let dir = TempDir::new().unwrap();
        let out = WriteTool
            .execute(json!({"file_path": "sub/a.txt", "content": "hello"}), &ctx(&dir))
            .await
            .unwrap();
        assert!(out.starts_with("Written: "));
        assert!(dir.path().join("sub/a.txt").exists());

        let out = ReadTool
            .execute(json!({"path": "sub/a.txt"}), &ctx(&dir))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let out = ReadTool
            .execute(json!({"file_path": "nope.txt"}), &ctx(&dir))
            .await
            .unwrap();
        assert!(out.starts_with("Error: not found: "));
    }

    #[tokio::test]
    async fn test_read_caps_output() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(20_000)).unwrap();
        let out = ReadTool
            .execute(json!({"file_path": "big.txt"}), &ctx(&dir))
            .await
            .unwrap();
        assert_eq!(out.chars().count(), READ_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_list_dir_caps_output() {
        let dir = TempDir::new().unwrap();
        for i in 0..600 {
            let name = format!("{:03}_{}.txt", i, "n".repeat(40));
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let out = ListDirTool
            .execute(json!({}), &ctx(&dir))
            .await
            .unwrap();
        assert_eq!(out.chars().count(), READ_MAX_CHARS);
        assert!(out.starts_with("000_"));
    }

    #[tokio::test]
    async fn test_read_requires_path() {
        let err = ReadTool.execute(json!({}), &ToolContext::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::XiaoError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_edit_replaces_first_occurrence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("e.txt"), "foo foo").unwrap();
        let out = EditTool
            .execute(
                json!({"file_path": "e.txt", "old_string": "foo", "new_string": "bar"}),
                &ctx(&dir),
            )
            .await
            .unwrap();
        assert!(out.starts_with("Edited: "));
        assert_eq!(std::fs::read_to_string(dir.path().join("e.txt")).unwrap(), "bar foo");

        let out = EditTool
            .execute(
                json!({"file_path": "e.txt", "old_string": "zzz", "new_string": "y"}),
                &ctx(&dir),
            )
            .await
            .unwrap();
        assert_eq!(out, "Error: old_string not found in file");
    }

    #[tokio::test]
    async fn test_list_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "12345").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(dir.path().join("a_dir")).unwrap();

        let out = ListDirTool.execute(json!({}), &ctx(&dir)).await.unwrap();
        assert_eq!(out, "a_dir/\nb.txt (5B)");
    }

    #[tokio::test]
    async fn test_list_dir_empty_and_not_dir() {
        let dir = TempDir::new().unwrap();
        let out = ListDirTool.execute(json!({"path": "."}), &ctx(&dir)).await.unwrap();
        assert_eq!(out, "(empty directory)");

        std::fs::write(dir.path().join("f"), "").unwrap();
        let out = ListDirTool.execute(json!({"path": "f"}), &ctx(&dir)).await.unwrap();
        assert!(out.starts_with("Error: not a directory"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(2048), "2KB");
        assert_eq!(format_size(3 * 1024 * 1024 + 1), "3MB");
    }
}
