//! Workspace memory (markdown files).
//!
//! Long-lived notes live in `{workspace}/MEMORY.md`, day-by-day notes in
//! `{workspace}/memory/YYYY-MM-DD.md`. Both are plain markdown so a human can
//! edit them; the agent reads them through keyword search and line-ranged
//! reads, and compaction hands doomed messages here before they are dropped.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, XiaoError};
use crate::session::Message;

/// Maximum daily files scanned by [`MemoryManager::search`], newest first.
const RECENT_DAILY_FILES: usize = 30;

/// Default hits returned by [`MemoryManager::search`].
pub const DEFAULT_SEARCH_RESULTS: usize = 10;

/// Files injected into the system prompt when present in the workspace.
pub const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "IDENTITY.md"];

/// Lines containing any of these are kept when history is compacted away.
const IMPORTANT_MARKERS: &[&str] = &["remember", "important", "todo", "决定", "记住", "注意"];

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryHit {
    /// Workspace-relative file path.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// Trimmed line content.
    pub content: String,
    /// Number of query keywords found on the line.
    pub score: usize,
}

impl std::fmt::Display for MemoryHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.file, self.line, self.content)
    }
}

/// Manager for `MEMORY.md` and the daily memory directory.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    workspace: PathBuf,
}

impl MemoryManager {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn memory_file(&self) -> PathBuf {
        self.workspace.join("MEMORY.md")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.workspace.join("memory")
    }

    fn daily_path(&self, date: &str) -> PathBuf {
        self.memory_dir().join(format!("{}.md", date))
    }

    /// Keyword search over `MEMORY.md` then the most recent daily files.
    ///
    /// Words shorter than two characters are ignored. Within a file, hits are
    /// ordered by score (keywords matched), highest first.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<MemoryHit>> {
        let keywords: Vec<String> = query
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .map(str::to_lowercase)
            .collect();
        if keywords.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let workspace = self.workspace.clone();
        let memory_file = self.memory_file();
        let memory_dir = self.memory_dir();

        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            if memory_file.is_file() {
                files.push(memory_file);
            }
            files.extend(recent_daily_files(&memory_dir, RECENT_DAILY_FILES));

            let mut hits = Vec::new();
            for file in files {
                if hits.len() >= max_results {
                    break;
                }
                let limit = max_results - hits.len();
                hits.extend(search_file(&workspace, &file, &keywords, limit));
            }
            hits.truncate(max_results);
            hits
        })
        .await
        .map_err(|e| XiaoError::Tool(format!("Memory search task failed: {}", e)))
    }

    /// Read lines `start_line..=end_line` (1-based) of a workspace-relative
    /// memory file. `end_line == 0` reads to the end.
    pub async fn get(&self, file_path: &str, start_line: usize, end_line: usize) -> Result<String> {
        let path = self.resolve_relative(file_path)?;
        if !path.is_file() {
            return Err(XiaoError::NotFound(file_path.to_string()));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let lines: Vec<&str> = content.split('\n').collect();
        let end = if end_line == 0 {
            lines.len()
        } else {
            end_line.min(lines.len())
        };
        let start = start_line.saturating_sub(1).min(end);
        Ok(lines[start..end].join("\n"))
    }

    /// Read `MEMORY.md`, or an empty string when it does not exist.
    pub async fn read_memory(&self) -> Result<String> {
        read_optional(&self.memory_file()).await
    }

    /// Read the daily file for `date` (`YYYY-MM-DD`, default today).
    pub async fn read_daily(&self, date: Option<&str>) -> Result<String> {
        let date = date.map(str::to_string).unwrap_or_else(today);
        read_optional(&self.daily_path(&date)).await
    }

    /// Overwrite `MEMORY.md`.
    pub async fn write_memory(&self, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.workspace).await?;
        tokio::fs::write(self.memory_file(), content).await?;
        info!("MEMORY.md updated");
        Ok(())
    }

    /// Append a paragraph to `MEMORY.md`.
    pub async fn append_memory(&self, text: &str) -> Result<()> {
        let existing = self.read_memory().await?;
        self.write_memory(&append_paragraph(&existing, text)).await
    }

    /// Append a paragraph to a daily file (default today), creating it with a
    /// `# YYYY-MM-DD` heading. Returns the date written to.
    pub async fn append_daily(&self, text: &str, date: Option<&str>) -> Result<String> {
        let date = date.map(str::to_string).unwrap_or_else(today);
        tokio::fs::create_dir_all(self.memory_dir()).await?;
        let path = self.daily_path(&date);
        let existing = match read_optional(&path).await? {
            s if s.is_empty() => format!("# {}\n", date),
            s => s,
        };
        tokio::fs::write(&path, append_paragraph(&existing, text)).await?;
        info!(date = %date, "Daily memory updated");
        Ok(date)
    }

    /// Keep what matters from messages about to be compacted away.
    ///
    /// Writes the summary under `## Compaction Summary` plus every line that
    /// carries an importance marker into today's daily file. Returns the
    /// number of entries written.
    pub async fn flush_important(&self, messages: &[Message], summary: &str) -> Result<usize> {
        let mut entries = Vec::new();
        if !summary.trim().is_empty() {
            entries.push(format!("## Compaction Summary\n{}", summary.trim()));
        }
        for msg in messages {
            for line in msg.content.lines() {
                let lower = line.to_lowercase();
                if IMPORTANT_MARKERS.iter().any(|m| lower.contains(m)) {
                    entries.push(format!("- {}", line.trim()));
                }
            }
        }
        if entries.is_empty() {
            return Ok(0);
        }
        self.append_daily(&entries.join("\n"), None).await?;
        Ok(entries.len())
    }

    /// Read the workspace bootstrap files that exist, keyed by file name.
    pub async fn read_bootstrap_files(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        for name in BOOTSTRAP_FILES {
            let path = self.workspace.join(name);
            if !path.is_file() {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    files.insert(name.to_string(), content);
                }
                Err(e) => warn!(file = %name, error = %e, "Failed to read bootstrap file"),
            }
        }
        files
    }

    fn resolve_relative(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel.trim());
        let escapes = rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if rel.trim().is_empty() || escapes {
            return Err(XiaoError::SecurityViolation(format!(
                "memory path must be relative to the workspace: {}",
                rel
            )));
        }
        Ok(self.workspace.join(rel_path))
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn append_paragraph(existing: &str, text: &str) -> String {
    let head = existing.trim_end();
    if head.is_empty() {
        format!("{}\n", text.trim())
    } else {
        format!("{}\n\n{}\n", head, text.trim())
    }
}

async fn read_optional(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn recent_daily_files(dir: &Path, limit: usize) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "md"))
        .collect();
    files.sort_by(|a, b| b.cmp(a));
    files.truncate(limit);
    files
}

fn search_file(workspace: &Path, file: &Path, keywords: &[String], limit: usize) -> Vec<MemoryHit> {
    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            warn!(file = %file.display(), error = %e, "Failed to search memory file");
            return Vec::new();
        }
    };
    let rel = file
        .strip_prefix(workspace)
        .unwrap_or(file)
        .to_string_lossy()
        .to_string();

    let mut hits: Vec<MemoryHit> = content
        .split('\n')
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| {
            let lower = line.to_lowercase();
            let score = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            (score > 0).then(|| MemoryHit {
                file: rel.clone(),
                line: i + 1,
                content: line.trim().to_string(),
                score,
            })
        })
        .collect();
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, MemoryManager) {
        let dir = TempDir::new().unwrap();
        let mm = MemoryManager::new(dir.path());
        (dir, mm)
    }

    #[tokio::test]
    async fn test_search_prefers_memory_file_then_recent_daily() {
        let (dir, mm) = setup();
        std::fs::write(dir.path().join("MEMORY.md"), "# Notes\nUser likes rust\n\nrust and tokio fan\n").unwrap();
        std::fs::create_dir_all(dir.path().join("memory")).unwrap();
        std::fs::write(dir.path().join("memory/2026-01-01.md"), "old rust note\n").unwrap();
        std::fs::write(dir.path().join("memory/2026-02-01.md"), "new rust note\n").unwrap();

        let hits = mm.search("rust tokio", 10).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].file, "MEMORY.md");
        assert_eq!(hits[0].line, 4);
        assert_eq!(hits[0].score, 2);
        assert_eq!(hits[1].to_string(), "[MEMORY.md:2] User likes rust");
        assert_eq!(hits[2].file, "memory/2026-02-01.md");
        assert_eq!(hits[3].file, "memory/2026-01-01.md");
    }

    #[tokio::test]
    async fn test_search_limits_and_ignores_short_words() {
        let (dir, mm) = setup();
        std::fs::write(dir.path().join("MEMORY.md"), "alpha\nalpha\nalpha\n").unwrap();
        assert_eq!(mm.search("alpha", 2).await.unwrap().len(), 2);
        assert!(mm.search("a", 10).await.unwrap().is_empty());
        assert!(mm.search("missing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_line_range() {
        let (dir, mm) = setup();
        std::fs::write(dir.path().join("MEMORY.md"), "one\ntwo\nthree\nfour").unwrap();
        assert_eq!(mm.get("MEMORY.md", 2, 3).await.unwrap(), "two\nthree");
        assert_eq!(mm.get("MEMORY.md", 3, 0).await.unwrap(), "three\nfour");
        assert_eq!(mm.get("MEMORY.md", 9, 0).await.unwrap(), "");
        assert!(matches!(
            mm.get("nope.md", 1, 0).await,
            Err(XiaoError::NotFound(_))
        ));
        assert!(matches!(
            mm.get("../etc/passwd", 1, 0).await,
            Err(XiaoError::SecurityViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_append_memory_and_daily() {
        let (_dir, mm) = setup();
        mm.append_memory("first").await.unwrap();
        mm.append_memory("second").await.unwrap();
        assert_eq!(mm.read_memory().await.unwrap(), "first\n\nsecond\n");

        let date = mm.append_daily("did a thing", Some("2026-03-04")).await.unwrap();
        assert_eq!(date, "2026-03-04");
        assert_eq!(
            mm.read_daily(Some("2026-03-04")).await.unwrap(),
            "# 2026-03-04\n\ndid a thing\n"
        );
        assert_eq!(mm.read_daily(Some("1999-01-01")).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_flush_important() {
        let (_dir, mm) = setup();
        let messages = vec![
            Message::user("please REMEMBER my cat is called Miso\nnothing else"),
            Message::assistant("ok"),
            Message::user("记住：周五开会"),
        ];
        let written = mm.flush_important(&messages, "talked about pets").await.unwrap();
        assert_eq!(written, 3);

        let daily = mm.read_daily(None).await.unwrap();
        assert!(daily.contains("## Compaction Summary\ntalked about pets"));
        assert!(daily.contains("- please REMEMBER my cat is called Miso"));
        assert!(daily.contains("- 记住：周五开会"));
        assert!(!daily.contains("nothing else"));
    }

    #[tokio::test]
    async fn test_flush_nothing_important_writes_nothing() {
        let (dir, mm) = setup();
        let written = mm.flush_important(&[Message::user("hi")], "").await.unwrap();
        assert_eq!(written, 0);
        assert!(!dir.path().join("memory").exists());
    }

    #[tokio::test]
    async fn test_read_bootstrap_files() {
        let (dir, mm) = setup();
        std::fs::write(dir.path().join("SOUL.md"), "be kind").unwrap();
        std::fs::write(dir.path().join("OTHER.md"), "ignored").unwrap();
        let files = mm.read_bootstrap_files().await;
        assert_eq!(files.len(), 1);
        assert_eq!(files["SOUL.md"], "be kind");
    }
}
