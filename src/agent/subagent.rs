//! Sub-agents: independent agent runs in the background.
//!
//! Each task runs the agent loop on its own `subagent:{id}` session, so it
//! never contends with the conversation that spawned it. Tasks are internal
//! work: they skip the rate limiter and `message_received` hooks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::utils::string::preview;

use super::{AgentLoop, RunOutcome};

/// User id sub-agent runs are attributed to.
pub const SUBAGENT_USER: &str = "subagent";

/// Finished tasks kept around for `list`/`get` before the oldest are dropped.
pub const KEEP_FINISHED: usize = 64;

/// System prompt for sub-agent runs.
pub const SUBAGENT_SYSTEM_PROMPT: &str = r#"You are a xiaoclaw sub-agent working on a single delegated task.

Rules:
- Complete the task with the tools available, then stop
- Your final message is returned verbatim to the agent that spawned you, so make it a self-contained result
- Be concise: report findings and outcomes, not your process
- Do not ask questions; nobody will answer them. State assumptions instead
- If the task cannot be done, say so and explain why in one or two sentences"#;

/// Lifecycle of a sub-agent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubagentStatus {
    Running,
    Done(String),
    Error(String),
}

impl From<RunOutcome> for SubagentStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Answered(text) => Self::Done(text),
            RunOutcome::Stopped(text) => Self::Error(text),
        }
    }
}

/// Snapshot of one sub-agent task.
#[derive(Debug, Clone)]
pub struct SubagentInfo {
    pub id: String,
    pub task: String,
    pub status: SubagentStatus,
}

struct Entry {
    info: SubagentInfo,
    handle: Option<JoinHandle<()>>,
    /// Flips to true when the run completes. The sender is dropped on abort.
    done: watch::Receiver<bool>,
    finished_at: Option<Instant>,
}

impl Entry {
    fn finish(&mut self, status: SubagentStatus) {
        self.info.status = status;
        self.finished_at.get_or_insert_with(Instant::now);
    }
}

/// Tracks spawned sub-agent tasks.
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use xiaoclaw::agent::{AgentLoop, SubagentManager, SubagentStatus};
/// use xiaoclaw::config::Config;
/// use xiaoclaw::session::SessionManager;
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::TempDir::new().unwrap();
/// let mut config = Config::default();
/// config.workspace = dir.path().to_string_lossy().to_string();
/// let agent = Arc::new(AgentLoop::new(config, SessionManager::new_memory()));
///
/// let manager = SubagentManager::new();
/// let id = manager.spawn("version", Arc::clone(&agent)).await;
/// let info = manager.wait(&id, Duration::from_secs(5)).await.unwrap();
/// assert!(matches!(info.status, SubagentStatus::Done(_)));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct SubagentManager {
    tasks: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SubagentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` in the background and return its id.
    ///
    /// The run bypasses admission (rate limit, `message_received` hooks) and
    /// uses [`SUBAGENT_SYSTEM_PROMPT`].
    pub async fn spawn(&self, task: &str, agent: Arc<AgentLoop>) -> String {
        let id: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let session_key = format!("subagent:{}", id);
        let (done_tx, done_rx) = watch::channel(false);

        // Registered before the task starts so completion always finds it.
        let mut tasks = self.tasks.write().await;
        evict_finished(&mut tasks, KEEP_FINISHED);
        tasks.insert(
            id.clone(),
            Entry {
                info: SubagentInfo {
                    id: id.clone(),
                    task: task.to_string(),
                    status: SubagentStatus::Running,
                },
                handle: None,
                done: done_rx,
                finished_at: None,
            },
        );

        let registry = Arc::clone(&self.tasks);
        let task_id = id.clone();
        let text = task.to_string();
        let handle = tokio::spawn(async move {
            let status = match agent
                .run_task(&session_key, SUBAGENT_USER, &text, SUBAGENT_SYSTEM_PROMPT)
                .await
            {
                Ok(outcome) => SubagentStatus::from(outcome),
                Err(e) => SubagentStatus::Error(e.to_string()),
            };

            {
                let mut tasks = registry.write().await;
                if let Some(entry) = tasks.get_mut(&task_id) {
                    // Timed out or cancelled tasks keep their error.
                    if entry.info.status == SubagentStatus::Running {
                        entry.finish(status);
                    }
                    entry.handle = None;
                }
            }
            let _ = done_tx.send(true);
            info!(subagent = %task_id, "Sub-agent finished");
        });

        if let Some(entry) = tasks.get_mut(&id) {
            entry.handle = Some(handle);
        }
        info!(subagent = %id, task = %preview(task, 80), "Spawned sub-agent");
        id
    }

    /// Wait up to `timeout` for a task. On expiry the task is marked
    /// `Error("Timed out")` and left running detached. `None` for unknown ids.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Option<SubagentInfo> {
        let mut done = {
            let tasks = self.tasks.read().await;
            let entry = tasks.get(id)?;
            if entry.info.status != SubagentStatus::Running {
                return Some(entry.info.clone());
            }
            entry.done.clone()
        };

        // An aborted task drops its sender, which also ends the wait.
        let finished = tokio::time::timeout(timeout, done.wait_for(|d| *d))
            .await
            .is_ok();

        let mut tasks = self.tasks.write().await;
        let entry = tasks.get_mut(id)?;
        if !finished && entry.info.status == SubagentStatus::Running {
            warn!(subagent = %id, "Sub-agent timed out, detaching");
            entry.finish(SubagentStatus::Error("Timed out".to_string()));
        }
        Some(entry.info.clone())
    }

    /// Spawn, wait, and render the outcome as a single string.
    pub async fn spawn_and_wait(&self, task: &str, agent: Arc<AgentLoop>, timeout: Duration) -> String {
        let id = self.spawn(task, agent).await;
        match self.wait(&id, timeout).await.map(|info| info.status) {
            Some(SubagentStatus::Done(result)) => result,
            Some(SubagentStatus::Error(e)) => format!("[Subagent error: {}]", e),
            Some(SubagentStatus::Running) | None => "[Subagent error: Not found]".to_string(),
        }
    }

    /// Abort a running task. Returns false if it is unknown or already finished.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(entry) = tasks.get_mut(id) else {
            return false;
        };
        let Some(handle) = entry.handle.take() else {
            return false;
        };
        if handle.is_finished() {
            return false;
        }
        handle.abort();
        entry.info.status = SubagentStatus::Error("Cancelled".to_string());
        entry.finished_at.get_or_insert_with(Instant::now);
        info!(subagent = %id, "Cancelled sub-agent");
        true
    }

    /// Drop every finished task. Timed-out tasks still running detached are
    /// kept so they can be cancelled. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        evict_finished(&mut tasks, 0);
        before - tasks.len()
    }

    /// Every known task, sorted by id.
    pub async fn list(&self) -> Vec<SubagentInfo> {
        let tasks = self.tasks.read().await;
        let mut infos: Vec<SubagentInfo> = tasks.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Status of a single task.
    pub async fn get(&self, id: &str) -> Option<SubagentInfo> {
        self.tasks.read().await.get(id).map(|e| e.info.clone())
    }
}

/// Drop the oldest finished entries until at most `keep` remain.
fn evict_finished(tasks: &mut HashMap<String, Entry>, keep: usize) {
    let mut finished: Vec<(Instant, String)> = tasks
        .iter()
        .filter(|(_, e)| e.handle.is_none() && e.info.status != SubagentStatus::Running)
        .filter_map(|(id, e)| e.finished_at.map(|at| (at, id.clone())))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::SessionManager;
    use tempfile::TempDir;

    fn agent(dir: &TempDir) -> Arc<AgentLoop> {
        let mut config = Config::default();
        config.workspace = dir.path().to_string_lossy().to_string();
        Arc::new(AgentLoop::new(config, SessionManager::new_memory()))
    }

    #[tokio::test]
    async fn test_spawn_and_wait_offline() {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        let manager = SubagentManager::new();

        let out = manager
            .spawn_and_wait("summarize the repo", Arc::clone(&agent), Duration::from_secs(5))
            .await;
        assert_eq!(out, "[offline mode] You said: summarize the repo");

        let list = manager.list().await;
        assert_eq!(list.len(), 1);
        assert!(agent
            .sessions()
            .exists(&format!("subagent:{}", list[0].id))
            .await);
    }

    #[tokio::test]
    async fn test_subagents_skip_admission() {
        use crate::error::Result;
        use crate::hooks::{HookContext, HookEvent, HookHandler};
        use async_trait::async_trait;

        struct Refuse;

        #[async_trait]
        impl HookHandler for Refuse {
            async fn handle(&self, _event: HookEvent, _ctx: &HookContext) -> Result<Option<String>> {
                Ok(Some("refused".to_string()))
            }
        }

        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.workspace = dir.path().to_string_lossy().to_string();
        config.rate_limit.max_calls = 2;
        let agent = Arc::new(AgentLoop::new(config, SessionManager::new_memory()));
        agent
            .register_hook(HookEvent::MessageReceived, Arc::new(Refuse))
            .await;
        let manager = SubagentManager::new();

        for i in 0..5 {
            let task = format!("task {}", i);
            let out = manager
                .spawn_and_wait(&task, Arc::clone(&agent), Duration::from_secs(5))
                .await;
            assert_eq!(out, format!("[offline mode] You said: {}", task));
        }
        // The inbound path is still guarded for regular users.
        assert_eq!(agent.process("cli:a", "alice", "hi").await, "refused");
    }

    #[tokio::test]
    async fn test_failed_run_is_error() {
        use crate::error::{Result, XiaoError};
        use crate::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
        use crate::session::Message;
        use async_trait::async_trait;

        struct Broken;

        #[async_trait]
        impl LLMProvider for Broken {
            async fn chat(
                &self,
                _messages: Vec<Message>,
                _tools: Vec<ToolDefinition>,
                _model: Option<&str>,
                _options: ChatOptions,
            ) -> Result<LLMResponse> {
                Err(XiaoError::Provider("boom".into()))
            }

            fn default_model(&self) -> &str {
                "broken"
            }

            fn name(&self) -> &str {
                "broken"
            }
        }

        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.workspace = dir.path().to_string_lossy().to_string();
        config.retry.max_attempts = 1;
        let agent = Arc::new(AgentLoop::new(config, SessionManager::new_memory()));
        agent.set_provider(Arc::new(Broken)).await;
        let manager = SubagentManager::new();

        let id = manager.spawn("anything", Arc::clone(&agent)).await;
        let info = manager.wait(&id, Duration::from_secs(5)).await.unwrap();
        match info.status {
            SubagentStatus::Error(e) => assert!(e.contains("boom"), "{}", e),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prune_finished() {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        let manager = SubagentManager::new();

        for _ in 0..3 {
            let id = manager.spawn("hello", Arc::clone(&agent)).await;
            manager.wait(&id, Duration::from_secs(5)).await.unwrap();
        }
        assert_eq!(manager.list().await.len(), 3);
        assert_eq!(manager.prune().await, 3);
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_finished_entries_are_bounded() {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        let manager = SubagentManager::new();

        for _ in 0..KEEP_FINISHED + 5 {
            let id = manager.spawn("hello", Arc::clone(&agent)).await;
            manager.wait(&id, Duration::from_secs(5)).await.unwrap();
        }
        assert!(manager.list().await.len() <= KEEP_FINISHED + 1);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let manager = SubagentManager::new();
        assert!(manager.wait("nope", Duration::from_millis(10)).await.is_none());
        assert!(!manager.cancel("nope").await);
        assert!(manager.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_and_cancel() {
        use crate::error::Result;
        use crate::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
        use crate::session::Message;
        use async_trait::async_trait;

        struct Slow;

        #[async_trait]
        impl LLMProvider for Slow {
            async fn chat(
                &self,
                _messages: Vec<Message>,
                _tools: Vec<ToolDefinition>,
                _model: Option<&str>,
                _options: ChatOptions,
            ) -> Result<LLMResponse> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(LLMResponse::text("late"))
            }

            fn default_model(&self) -> &str {
                "slow"
            }

            fn name(&self) -> &str {
                "slow"
            }
        }

        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.set_provider(Arc::new(Slow)).await;
        let manager = SubagentManager::new();

        let id = manager.spawn("slow job", Arc::clone(&agent)).await;
        let info = manager.wait(&id, Duration::from_millis(50)).await.unwrap();
        assert_eq!(info.status, SubagentStatus::Error("Timed out".into()));
        // Still running detached, so it can be cancelled.
        assert!(manager.cancel(&id).await);
        assert_eq!(
            manager.get(&id).await.unwrap().status,
            SubagentStatus::Error("Cancelled".into())
        );
        assert!(!manager.cancel(&id).await);
    }
}
