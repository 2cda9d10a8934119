//! Session module - conversation state and persistence
//!
//! - [`Session`]: append-only message log with token accounting and a
//!   token-budgeted context window
//! - [`jsonl`]: the line-oriented on-disk format
//! - [`SessionManager`]: hands out sessions as `Arc<Mutex<Session>>` so each
//!   conversation has exactly one writer at a time
//!
//! # Example
//!
//! ```
//! use xiaoclaw::session::{Message, SessionManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new_memory();
//!     let handle = manager.get_or_create("cli:default").await.unwrap();
//!     let mut session = handle.lock().await;
//!     session.add_message(Message::user("Hello!")).await.unwrap();
//!     assert_eq!(session.message_count(), 1);
//! }
//! ```

pub mod jsonl;
pub mod types;

pub use types::{estimate_tokens, Message, Role, Session, SessionMeta, ToolCall};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::Result;

/// Shared handle to a live session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Listing entry for a persisted session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

/// Session manager for storing and retrieving conversation sessions.
///
/// Live sessions are cached in memory; with a storage directory every
/// session is backed by `{dir}/{sanitized-id}.jsonl`.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    storage_path: Option<PathBuf>,
}

impl SessionManager {
    /// Create a session manager persisting into `path` (created if missing).
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    /// Create an in-memory session manager without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Storage directory, if persistence is enabled.
    pub fn storage_path(&self) -> Option<&PathBuf> {
        self.storage_path.as_ref()
    }

    /// Create a fresh session with a short random id.
    pub async fn create(&self) -> Result<SessionHandle> {
        let id: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        info!(session = %id, "Creating session");
        self.get_or_create(&id).await
    }

    /// Get a live session, restore it from disk, or create it.
    pub async fn get_or_create(&self, id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.restore(id).await? {
            return Ok(handle);
        }

        let session = match self.file_for(id) {
            Some(path) => Session::with_file(id, path),
            None => Session::new(id),
        };
        let handle = Arc::new(Mutex::new(session));

        let mut sessions = self.sessions.write().await;
        // Another task may have created it while we were checking the disk.
        let handle = sessions
            .entry(id.to_string())
            .or_insert_with(|| handle)
            .clone();
        Ok(handle)
    }

    /// Get a live or persisted session without creating it.
    pub async fn restore(&self, id: &str) -> Result<Option<SessionHandle>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(id) {
                return Ok(Some(Arc::clone(handle)));
            }
        }

        let Some(path) = self.file_for(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let session = Session::load(id, path).await?;
        debug!(session = %id, messages = session.message_count(), "Restored session from disk");
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone();
        Ok(Some(handle))
    }

    /// Delete a session from memory and disk. Returns whether anything existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let cached = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id).is_some()
        };

        let mut on_disk = false;
        if let Some(path) = self.file_for(id) {
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
                on_disk = true;
            }
        }

        if cached || on_disk {
            info!(session = %id, "Deleted session");
        }
        Ok(cached || on_disk)
    }

    /// Check if a session exists in memory or on disk.
    pub async fn exists(&self, id: &str) -> bool {
        if self.sessions.read().await.contains_key(id) {
            return true;
        }
        self.file_for(id).is_some_and(|p| p.exists())
    }

    /// List sessions, most recently modified first.
    ///
    /// Persisted sessions are read from disk (metadata from the first line);
    /// in-memory managers list their cached sessions.
    pub async fn list(&self) -> Result<Vec<SessionInfo>> {
        let Some(dir) = &self.storage_path else {
            let sessions = self.sessions.read().await;
            let mut infos = Vec::with_capacity(sessions.len());
            for (id, handle) in sessions.iter() {
                let session = handle.lock().await;
                infos.push(SessionInfo {
                    id: id.clone(),
                    created_at: Some(session.created_at),
                    updated_at: Some(session.updated_at),
                    path: PathBuf::new(),
                });
            }
            infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            return Ok(infos);
        };

        let mut entries = Vec::new();
        let mut dir_entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = dir_entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
                let modified = entry.metadata().await.and_then(|m| m.modified()).ok();
                entries.push((path, modified));
            }
        }
        entries.sort_by(|a, b| b.1.cmp(&a.1));

        let mut infos = Vec::with_capacity(entries.len());
        for (path, _) in entries {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let meta = jsonl::read_meta(&path).await;
            let id = match &meta {
                Some(m) if !m.id.is_empty() => m.id.clone(),
                _ => Self::unsanitize_key(&stem),
            };
            infos.push(SessionInfo {
                id,
                created_at: meta.as_ref().map(|m| m.created_at),
                updated_at: meta.as_ref().map(|m| m.updated_at),
                path,
            });
        }
        Ok(infos)
    }

    /// Get the number of sessions held in memory.
    pub async fn cache_size(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn file_for(&self, id: &str) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", Self::sanitize_key(id))))
    }

    /// Percent-encode characters that are unsafe in filenames.
    ///
    /// The mapping is bijective, e.g. `telegram:chat/1` → `telegram%3Achat%2F1`.
    fn sanitize_key(key: &str) -> String {
        let mut result = String::with_capacity(key.len() * 3);
        for c in key.chars() {
            match c {
                '/' => result.push_str("%2F"),
                '\\' => result.push_str("%5C"),
                ':' => result.push_str("%3A"),
                '*' => result.push_str("%2A"),
                '?' => result.push_str("%3F"),
                '"' => result.push_str("%22"),
                '<' => result.push_str("%3C"),
                '>' => result.push_str("%3E"),
                '|' => result.push_str("%7C"),
                '%' => result.push_str("%25"),
                c => result.push(c),
            }
        }
        result
    }

    /// Inverse of [`Self::sanitize_key`].
    fn unsanitize_key(sanitized: &str) -> String {
        let mut result = String::with_capacity(sanitized.len());
        let mut chars = sanitized.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                result.push(c);
                continue;
            }
            let hex: String = chars.by_ref().take(2).collect();
            match u8::from_str_radix(&hex, 16) {
                Ok(byte) if hex.len() == 2 => result.push(byte as char),
                _ => {
                    result.push('%');
                    result.push_str(&hex);
                }
            }
        }
        result
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_or_create_returns_same_handle() {
        let manager = SessionManager::new_memory();
        let a = manager.get_or_create("k").await.unwrap();
        let b = manager.get_or_create("k").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.cache_size().await, 1);
    }

    #[tokio::test]
    async fn test_create_uses_short_id() {
        let manager = SessionManager::new_memory();
        let handle = manager.create().await.unwrap();
        assert_eq!(handle.lock().await.id.len(), 8);
    }

    #[tokio::test]
    async fn test_persisted_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        {
            let handle = manager.get_or_create("telegram:42").await.unwrap();
            let mut session = handle.lock().await;
            session.add_message(Message::user("Hello")).await.unwrap();
            session.add_message(Message::assistant("Hi")).await.unwrap();
        }

        let fresh = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        let handle = fresh.restore("telegram:42").await.unwrap().unwrap();
        let session = handle.lock().await;
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "Hello");
        assert_eq!(session.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_restore_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let manager = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        assert!(manager.restore("nope").await.unwrap().is_none());
        assert!(!manager.exists("nope").await);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let manager = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        for id in ["s1", "s2"] {
            let handle = manager.get_or_create(id).await.unwrap();
            handle
                .lock()
                .await
                .add_message(Message::user("x"))
                .await
                .unwrap();
        }

        let listed = manager.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.created_at.is_some()));

        assert!(manager.delete("s1").await.unwrap());
        assert!(!manager.delete("s1").await.unwrap());
        assert_eq!(manager.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_list() {
        let manager = SessionManager::new_memory();
        manager.get_or_create("a").await.unwrap();
        manager.get_or_create("b").await.unwrap();
        assert_eq!(manager.list().await.unwrap().len(), 2);
    }

    #[test]
    fn test_sanitize_key_roundtrip() {
        for key in ["telegram:chat123", "a/b\\c", "100%", "plain", "q?*<>|\""] {
            let sanitized = SessionManager::sanitize_key(key);
            assert!(!sanitized.contains('/'));
            assert!(!sanitized.contains(':'));
            assert_eq!(SessionManager::unsanitize_key(&sanitized), key);
        }
    }

    #[test]
    fn test_sanitize_no_collisions() {
        assert_ne!(
            SessionManager::sanitize_key("a:b"),
            SessionManager::sanitize_key("a_b")
        );
    }
}
