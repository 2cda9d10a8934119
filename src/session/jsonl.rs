//! JSONL persistence for sessions.
//!
//! One record per line. The first line is a `{"_meta": true, ...}` record
//! carrying creation and update times; every following line is a message.
//! Incremental appends and full rewrites produce the same shape, so a single
//! line-oriented reader handles both.

use std::path::Path;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::Result;

use super::types::{Message, SessionMeta};

/// Parsed contents of a session file.
#[derive(Debug, Default)]
pub struct SessionFile {
    pub meta: Option<SessionMeta>,
    pub messages: Vec<Message>,
}

/// Append one message line, writing the metadata line first if the file is new.
pub async fn append_message(path: &Path, meta: &SessionMeta, message: &Message) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let is_new = match tokio::fs::metadata(path).await {
        Ok(m) => m.len() == 0,
        Err(_) => true,
    };

    let mut buf = String::new();
    if is_new {
        buf.push_str(&serde_json::to_string(meta)?);
        buf.push('\n');
    }
    buf.push_str(&serde_json::to_string(message)?);
    buf.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buf.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Rewrite the whole file (metadata line plus every message).
///
/// Writes to a sibling temp file and renames it into place so a crash never
/// leaves a half-written session behind.
pub async fn write_all(path: &Path, meta: &SessionMeta, messages: &[Message]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut buf = serde_json::to_string(meta)?;
    buf.push('\n');
    for message in messages {
        buf.push_str(&serde_json::to_string(message)?);
        buf.push('\n');
    }

    let tmp = path.with_extension("jsonl.tmp");
    tokio::fs::write(&tmp, buf).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read a session file line by line.
pub async fn read_file(path: &Path) -> Result<SessionFile> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse(&content, path))
}

/// Read only the metadata record (first line) of a session file.
pub async fn read_meta(path: &Path) -> Option<SessionMeta> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let first = content.lines().find(|l| !l.trim().is_empty())?;
    let value: Value = serde_json::from_str(first).ok()?;
    if is_meta(&value) {
        serde_json::from_value(value).ok()
    } else {
        None
    }
}

fn is_meta(value: &Value) -> bool {
    value.get("_meta").and_then(Value::as_bool).unwrap_or(false)
}

fn parse(content: &str, path: &Path) -> SessionFile {
    let mut file = SessionFile::default();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e, "Skipping malformed session line");
                continue;
            }
        };
        if is_meta(&value) {
            match serde_json::from_value(value) {
                Ok(meta) => file.meta = Some(meta),
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable session metadata"),
            }
            continue;
        }
        match serde_json::from_value::<Message>(value) {
            Ok(msg) => file.messages.push(msg),
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e, "Skipping invalid message record");
            }
        }
    }

    file
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Role, ToolCall};
    use chrono::Utc;
    use tempfile::TempDir;

    fn meta() -> SessionMeta {
        SessionMeta {
            meta: true,
            id: "s1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_writes_meta_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s1.jsonl");
        append_message(&path, &meta(), &Message::user("one")).await.unwrap();
        append_message(&path, &meta(), &Message::assistant("two")).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"_meta\":true"));
        assert!(!lines[1].contains("_meta"));
    }

    #[tokio::test]
    async fn test_rewrite_readable_by_line_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("s1.jsonl");
        let messages = vec![
            Message::user("q"),
            Message::assistant_with_tools("", vec![ToolCall::new("c1", "read", "{}")]),
            Message::tool_result("c1", "read", "data"),
        ];
        write_all(&path, &meta(), &messages).await.unwrap();

        let file = read_file(&path).await.unwrap();
        assert!(file.meta.is_some());
        assert_eq!(file.messages.len(), 3);
        assert_eq!(file.messages[2].role, Role::Tool);
        assert_eq!(file.messages[2].tool_call_id.as_deref(), Some("c1"));
        assert!(!path.with_extension("jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        let good = serde_json::to_string(&Message::user("kept")).unwrap();
        std::fs::write(&path, format!("{{broken\n{}\n{{\"role\":\"alien\"}}\n", good)).unwrap();

        let file = read_file(&path).await.unwrap();
        assert!(file.meta.is_none());
        assert_eq!(file.messages.len(), 1);
        assert_eq!(file.messages[0].content, "kept");
    }

    #[tokio::test]
    async fn test_read_meta() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.jsonl");
        write_all(&path, &meta(), &[]).await.unwrap();
        let m = read_meta(&path).await.unwrap();
        assert_eq!(m.id, "s1");
        assert!(read_meta(&dir.path().join("missing.jsonl")).await.is_none());
    }
}
