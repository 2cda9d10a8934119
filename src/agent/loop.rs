//! Agent loop implementation
//!
//! Drives one inbound message through rate limiting, hooks, the provider
//! and any number of tool rounds until the model answers in plain text or
//! the round ceiling is hit.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{Result, XiaoError};
use crate::hooks::{HookContext, HookEvent, HookHandler, HookManager};
use crate::memory::MemoryManager;
use crate::providers::{
    provider_from_config, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, RetryProvider,
    StreamEvent, ToolDefinition, Usage,
};
use crate::ratelimit::SlidingWindowRateLimiter;
use crate::security::SecurityGate;
use crate::session::{Message, Session, SessionManager, ToolCall};
use crate::stats::UsageStats;
use crate::tools::{builtin_registry, Tool, ToolContext, ToolRegistry};

use super::compaction::{Compactor, ProviderSummarizer};
use super::context::{ContextBuilder, RuntimeContext};
use super::think::{strip_think, ThinkFilter};

/// Reply sent when the rate limiter rejects a message.
pub const RATE_LIMIT_REPLY: &str = "Rate limit exceeded. Please try again in a moment.";

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered. A cancelled stream answers with what was delivered.
    Answered(String),
    /// The provider failed or the round ceiling was hit. Carries the reply text.
    Stopped(String),
}

impl RunOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(text) | Self::Stopped(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Answered(text) | Self::Stopped(text) => text,
        }
    }
}

/// Outcome of one provider round.
enum Round {
    /// A complete response not yet shown to the caller.
    Reply(LLMResponse),
    /// Text already streamed to the caller.
    Streamed { content: String, usage: Option<Usage> },
    /// The caller dropped the stream; `partial` is what it received.
    Cancelled { partial: String },
    /// The provider failed, possibly after some text was streamed.
    Failed { partial: String, error: XiaoError },
}

/// The agent: owns sessions, tools, hooks and the provider, and turns
/// inbound messages into replies.
///
/// # Example
///
/// ```rust
/// use xiaoclaw::agent::AgentLoop;
/// use xiaoclaw::config::Config;
/// use xiaoclaw::session::SessionManager;
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::TempDir::new().unwrap();
/// let mut config = Config::default();
/// config.workspace = dir.path().to_string_lossy().to_string();
///
/// let agent = AgentLoop::new(config, SessionManager::new_memory());
/// let reply = agent.process("cli:default", "me", "hello").await;
/// assert!(reply.contains("offline"));
/// # });
/// ```
pub struct AgentLoop {
    config: Config,
    sessions: Arc<SessionManager>,
    /// Retry-wrapped provider; `None` means offline mode
    provider: Arc<RwLock<Option<Arc<dyn LLMProvider>>>>,
    tools: Arc<RwLock<ToolRegistry>>,
    hooks: RwLock<HookManager>,
    context_builder: RwLock<ContextBuilder>,
    compactor: RwLock<Arc<Compactor>>,
    gate: Arc<SecurityGate>,
    limiter: SlidingWindowRateLimiter,
    stats: Arc<UsageStats>,
    memory: Option<Arc<MemoryManager>>,
}

impl AgentLoop {
    /// Create an agent with the built-in tools and no provider.
    pub fn new(config: Config, sessions: SessionManager) -> Self {
        let workspace = config.workspace_path();
        let gate = Arc::new(SecurityGate::for_workspace(&config.security, &workspace));
        let memory = Some(Arc::new(MemoryManager::new(workspace)));
        let tools = builtin_registry(&config, Arc::clone(&gate), memory.clone());

        let mut context_builder = ContextBuilder::new();
        if let Some(prompt) = &config.agent.system_prompt {
            context_builder = context_builder.with_system_prompt(prompt);
        }

        let compactor = Arc::new(Self::build_compactor(&config, memory.clone(), None));

        Self {
            sessions: Arc::new(sessions),
            provider: Arc::new(RwLock::new(None)),
            tools: Arc::new(RwLock::new(tools)),
            hooks: RwLock::new(HookManager::from_config(&config.hooks)),
            context_builder: RwLock::new(context_builder),
            compactor: RwLock::new(compactor),
            gate,
            limiter: SlidingWindowRateLimiter::from_config(&config.rate_limit),
            stats: Arc::new(UsageStats::new()),
            memory,
            config,
        }
    }

    /// Create a fully wired agent: persistent sessions, workspace bootstrap
    /// files in the system prompt, and the configured provider if any.
    pub async fn from_config(config: Config) -> Result<Self> {
        let sessions = SessionManager::with_path(config.sessions_path())?;
        let agent = Self::new(config, sessions);
        agent.load_bootstrap_files().await;
        if let Some(provider) = provider_from_config(&agent.config) {
            agent.set_provider(provider).await;
        } else {
            info!("No API key configured, running in offline mode");
        }
        Ok(agent)
    }

    fn build_compactor(
        config: &Config,
        memory: Option<Arc<MemoryManager>>,
        provider: Option<Arc<dyn LLMProvider>>,
    ) -> Compactor {
        let mut compactor = Compactor::new(config.session.compaction_threshold)
            .with_keep_recent(config.session.keep_recent);
        if let Some(provider) = provider {
            compactor = compactor.with_summarizer(Arc::new(
                ProviderSummarizer::new(provider).with_model(&config.agent.model),
            ));
        }
        if let Some(memory) = memory {
            compactor = compactor.with_memory(memory);
        }
        compactor
    }

    /// Install a provider. It is wrapped in the configured retry policy and
    /// also becomes the compaction summarizer.
    pub async fn set_provider(&self, provider: Arc<dyn LLMProvider>) {
        let wrapped: Arc<dyn LLMProvider> =
            Arc::new(RetryProvider::from_config(provider, &self.config.retry));
        info!(provider = wrapped.name(), "Provider installed");

        let compactor =
            Self::build_compactor(&self.config, self.memory.clone(), Some(Arc::clone(&wrapped)));
        *self.compactor.write().await = Arc::new(compactor);
        *self.provider.write().await = Some(wrapped);
    }

    /// Drop the provider and fall back to offline mode.
    pub async fn clear_provider(&self) {
        *self.provider.write().await = None;
        let compactor = Self::build_compactor(&self.config, self.memory.clone(), None);
        *self.compactor.write().await = Arc::new(compactor);
    }

    pub async fn has_provider(&self) -> bool {
        self.provider.read().await.is_some()
    }

    /// Inject the workspace bootstrap files into the system prompt.
    pub async fn load_bootstrap_files(&self) {
        let Some(memory) = &self.memory else {
            return;
        };
        let files = memory.read_bootstrap_files().await;
        if !files.is_empty() {
            debug!(count = files.len(), "Loaded bootstrap files");
        }
        let mut builder = self.context_builder.write().await;
        *builder = builder.clone().with_bootstrap_files(files);
    }

    /// Register a tool. A tool with the same name is replaced.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.write().await.register(tool);
    }

    /// Soft-disable a tool. Returns false for unknown names.
    pub async fn disable_tool(&self, name: &str) -> bool {
        self.tools.write().await.disable(name)
    }

    /// Enabled tool names, sorted.
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.list_names()
    }

    pub async fn register_hook(&self, event: HookEvent, handler: Arc<dyn HookHandler>) {
        self.hooks.write().await.register(event, handler);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn stats(&self) -> Arc<UsageStats> {
        Arc::clone(&self.stats)
    }

    pub fn security(&self) -> &Arc<SecurityGate> {
        &self.gate
    }

    pub fn memory(&self) -> Option<&Arc<MemoryManager>> {
        self.memory.as_ref()
    }

    /// Process one inbound message and return the reply.
    ///
    /// Never fails: every failure comes back as a reply string.
    pub async fn process(&self, session_key: &str, user_id: &str, content: &str) -> String {
        let span = info_span!("message", session = %session_key, user = %user_id);
        self.handle(session_key, user_id, content, None)
            .instrument(span)
            .await
    }

    /// Like [`process`](Self::process), but the final answer is delivered
    /// through `tx` chunk by chunk. Early replies and errors arrive as a
    /// single chunk. Dropping the receiver cancels the stream; text already
    /// received stays in the session.
    pub async fn process_stream(
        &self,
        session_key: &str,
        user_id: &str,
        content: &str,
        tx: mpsc::Sender<String>,
    ) -> String {
        let span = info_span!("message", session = %session_key, user = %user_id, stream = true);
        self.handle(session_key, user_id, content, Some(&tx))
            .instrument(span)
            .await
    }

    async fn handle(
        &self,
        session_key: &str,
        user_id: &str,
        content: &str,
        tx: Option<&mpsc::Sender<String>>,
    ) -> String {
        if !self.limiter.check(user_id) {
            warn!("Rate limit exceeded");
            return emit_once(tx, RATE_LIMIT_REPLY.to_string()).await;
        }

        let hooks = self.hooks.read().await.clone();
        let ctx = HookContext::message(session_key, user_id, content);
        if let Some(reply) = hooks.fire(HookEvent::MessageReceived, &ctx).await {
            return emit_once(tx, reply).await;
        }

        let builder = self.context_builder.read().await.clone();
        match self
            .run(session_key, user_id, content, &builder, &hooks, tx)
            .await
        {
            Ok(outcome) => outcome.into_text(),
            Err(e) => {
                error!(error = %e, "Message processing failed");
                emit_once(tx, format!("Error: {}", e)).await
            }
        }
    }

    /// Run a background task on its own session, attributed to `user_id`.
    ///
    /// Unlike [`process`](Self::process) there is no admission step: the rate
    /// limiter and `message_received` hooks are skipped, and `system_prompt`
    /// replaces the configured one. Tool hooks and permissions still apply.
    pub async fn run_task(
        &self,
        session_key: &str,
        user_id: &str,
        task: &str,
        system_prompt: &str,
    ) -> Result<RunOutcome> {
        let span = info_span!("task", session = %session_key, user = %user_id);
        let builder = self
            .context_builder
            .read()
            .await
            .clone()
            .with_system_prompt(system_prompt);
        let hooks = self.hooks.read().await.clone();
        self.run(session_key, user_id, task, &builder, &hooks, None)
            .instrument(span)
            .await
    }

    /// Returns the outcome after its text has been delivered through `tx`
    /// (when streaming). Errors are session failures the caller reports.
    async fn run(
        &self,
        session_key: &str,
        user_id: &str,
        content: &str,
        builder: &ContextBuilder,
        hooks: &HookManager,
        tx: Option<&mpsc::Sender<String>>,
    ) -> Result<RunOutcome> {
        let handle = self.sessions.get_or_create(session_key).await?;
        let mut session = handle.lock().await;

        let provider = self.provider.read().await.clone();
        let Some(provider) = provider else {
            let reply = self.offline_reply(content).await;
            session.add_message(Message::user(content)).await?;
            session.add_message(Message::assistant(&reply)).await?;
            return Ok(RunOutcome::Answered(emit_once(tx, reply).await));
        };

        session.add_message(Message::user(content)).await?;
        let compactor = Arc::clone(&*self.compactor.read().await);
        if let Err(e) = compactor.maybe_compact(&mut session).await {
            warn!(error = %e, "Compaction failed, continuing with full history");
        }

        let model = self.config.agent.model.as_str();
        let options = ChatOptions::new()
            .with_max_tokens(self.config.agent.max_tokens)
            .with_temperature(self.config.agent.temperature);
        let max_rounds = self.config.agent.max_rounds;

        for round in 1..=max_rounds {
            let (definitions, names) = {
                let tools = self.tools.read().await;
                (tools.definitions(), tools.list_names())
            };
            let runtime = RuntimeContext::new()
                .with_tools(names)
                .with_workspace(&self.config.workspace_path().to_string_lossy())
                .with_os_info()
                .with_current_time();
            let messages = builder
                .clone()
                .with_runtime_context(runtime)
                .build_messages(session.context_window(self.config.session.max_context_tokens));
            debug!(round = round, messages = messages.len(), "Calling provider");

            let outcome = match tx {
                Some(tx) => {
                    self.stream_round(&provider, messages, definitions, model, options.clone(), tx)
                        .await
                }
                None => match provider
                    .chat(messages, definitions, Some(model), options.clone())
                    .await
                {
                    Ok(response) => Round::Reply(response),
                    Err(error) => Round::Failed {
                        partial: String::new(),
                        error,
                    },
                },
            };

            match outcome {
                Round::Reply(response) => {
                    self.stats.record(response.usage.as_ref());
                    if response.has_tool_calls() {
                        info!(round = round, calls = response.tool_calls.len(), "Tool round");
                        let calls: Vec<ToolCall> =
                            response.tool_calls.iter().map(ToolCall::from).collect();
                        session
                            .add_message(Message::assistant_with_tools(&response.content, calls))
                            .await?;
                        self.run_tool_batch(&mut session, user_id, hooks, &response.tool_calls)
                            .await?;
                        continue;
                    }

                    let text = strip_think(&response.content);
                    if !text.is_empty() {
                        session.add_message(Message::assistant(&text)).await?;
                    }
                    return Ok(RunOutcome::Answered(emit_once(tx, text).await));
                }
                Round::Streamed { content, usage } => {
                    self.stats.record(usage.as_ref());
                    let text = strip_think(&content);
                    if !text.is_empty() {
                        session.add_message(Message::assistant(&text)).await?;
                    }
                    return Ok(RunOutcome::Answered(text));
                }
                Round::Cancelled { partial } => {
                    info!(round = round, "Stream cancelled by caller");
                    if !partial.is_empty() {
                        session.add_message(Message::assistant(&partial)).await?;
                    }
                    return Ok(RunOutcome::Answered(partial));
                }
                Round::Failed { partial, error } => {
                    error!(round = round, error = %error, "LLM request failed");
                    if !partial.is_empty() {
                        session.add_message(Message::assistant(&partial)).await?;
                    }
                    let reply = format!("Error: LLM request failed: {}", error);
                    return Ok(RunOutcome::Stopped(emit_once(tx, reply).await));
                }
            }
        }

        warn!(max_rounds = max_rounds, "Round ceiling reached");
        let reply = format!("Stopped: exceeded max rounds ({}).", max_rounds);
        Ok(RunOutcome::Stopped(emit_once(tx, reply).await))
    }

    /// Consume one streamed response.
    ///
    /// The first event decides the path: text is forwarded as it arrives,
    /// while tool calls abandon the stream and repeat the round through the
    /// buffered `chat` call so the calls are handled like any other.
    async fn stream_round(
        &self,
        provider: &Arc<dyn LLMProvider>,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: &str,
        options: ChatOptions,
        tx: &mpsc::Sender<String>,
    ) -> Round {
        let mut rx = match provider
            .chat_stream(messages.clone(), tools.clone(), Some(model), options.clone())
            .await
        {
            Ok(rx) => rx,
            Err(error) => {
                return Round::Failed {
                    partial: String::new(),
                    error,
                }
            }
        };

        let mut filter = ThinkFilter::new();
        let mut raw = String::new();
        let mut delivered = String::new();

        loop {
            match rx.recv().await {
                Some(StreamEvent::Delta(text)) => {
                    raw.push_str(&text);
                    let visible = filter.push(&text);
                    if visible.is_empty() {
                        continue;
                    }
                    if tx.send(visible.clone()).await.is_err() {
                        return Round::Cancelled {
                            partial: delivered.trim().to_string(),
                        };
                    }
                    delivered.push_str(&visible);
                }
                Some(StreamEvent::ToolCalls(calls)) => {
                    if raw.is_empty() {
                        drop(rx);
                        debug!("Stream announced tool calls, falling back to chat");
                        return match provider.chat(messages, tools, Some(model), options).await {
                            Ok(response) => Round::Reply(response),
                            Err(error) => Round::Failed {
                                partial: String::new(),
                                error,
                            },
                        };
                    }
                    // Text already went out; keep it with the calls.
                    return Round::Reply(LLMResponse::with_tools(&delivered, calls));
                }
                Some(StreamEvent::Done { content, usage }) => {
                    let full = if raw.is_empty() { content } else { raw };
                    if delivered.is_empty() {
                        let mut rest = ThinkFilter::new();
                        let mut text = rest.push(&full);
                        text.push_str(&rest.finish());
                        if !text.is_empty() && tx.send(text).await.is_err() {
                            return Round::Cancelled {
                                partial: String::new(),
                            };
                        }
                    } else {
                        let tail = filter.finish();
                        if !tail.is_empty() && tx.send(tail).await.is_err() {
                            return Round::Cancelled {
                                partial: delivered.trim().to_string(),
                            };
                        }
                    }
                    return Round::Streamed {
                        content: full,
                        usage,
                    };
                }
                Some(StreamEvent::Error(error)) => {
                    return Round::Failed {
                        partial: delivered.trim().to_string(),
                        error,
                    };
                }
                None => {
                    debug!("Stream closed without a done event");
                    let tail = filter.finish();
                    if !tail.is_empty() {
                        let _ = tx.send(tail).await;
                    }
                    return Round::Streamed {
                        content: raw,
                        usage: None,
                    };
                }
            }
        }
    }

    /// Execute a batch of tool calls concurrently. Results are appended in
    /// completion order, one `tool` message per call id.
    async fn run_tool_batch(
        &self,
        session: &mut Session,
        user_id: &str,
        hooks: &HookManager,
        calls: &[LLMToolCall],
    ) -> Result<()> {
        let registry = self.tools.read().await.clone();
        let workspace = self.config.workspace_path();
        let ctx = ToolContext::new()
            .with_workspace(&workspace.to_string_lossy())
            .with_session(&session.id, user_id);

        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .map(|call| self.run_tool_call(&registry, hooks, &ctx, call))
            .collect();

        while let Some((call, result)) = pending.next().await {
            session
                .add_message(Message::tool_result(&call.id, &call.name, &result))
                .await?;
        }
        Ok(())
    }

    async fn run_tool_call<'a>(
        &self,
        registry: &ToolRegistry,
        hooks: &HookManager,
        ctx: &ToolContext,
        call: &'a LLMToolCall,
    ) -> (&'a LLMToolCall, String) {
        let args = parse_tool_arguments(call);
        let session_id = ctx.session_id.as_deref().unwrap_or_default();
        let user_id = ctx.user_id.as_deref().unwrap_or_default();

        let mut hook_ctx = HookContext::tool(session_id, &call.name, &args);
        hook_ctx.user_id = ctx.user_id.clone();

        let result = if let Some(value) = hooks.fire(HookEvent::BeforeToolCall, &hook_ctx).await {
            debug!(tool = %call.name, "Tool call short-circuited by hook");
            self.gate.log_tool_call(&call.name, &args);
            value
        } else if !self.gate.is_tool_allowed(user_id, &call.name) {
            self.gate.log_tool_blocked(user_id, &call.name);
            format!("Error: tool '{}' is not permitted for this user", call.name)
        } else {
            self.gate.log_tool_call(&call.name, &args);
            registry.call(&call.name, args.clone(), ctx).await
        };
        self.stats.record_tool();

        let after_ctx = hook_ctx.with_result(&result);
        let result = hooks
            .fire(HookEvent::AfterToolCall, &after_ctx)
            .await
            .unwrap_or(result);
        (call, result)
    }

    async fn offline_reply(&self, content: &str) -> String {
        let lower = content.trim().to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |options: &[&str]| words.iter().any(|w| options.contains(w));

        if has_word(&["hello", "hi", "hey"]) || lower.contains("你好") {
            format!(
                "Hello! I'm xiaoclaw v{}. No LLM provider is configured, so I'm running in offline mode. \
Set OPENAI_API_KEY to enable full conversations.",
                VERSION
            )
        } else if has_word(&["tools"]) || lower.contains("工具") {
            format!("Available tools: {}", self.tool_names().await.join(", "))
        } else if has_word(&["version"]) || lower.contains("版本") {
            format!("xiaoclaw v{}", VERSION)
        } else {
            format!("[offline mode] You said: {}", content.trim())
        }
    }
}

/// Decode tool arguments; malformed or non-object JSON becomes `{}`.
fn parse_tool_arguments(call: &LLMToolCall) -> Value {
    if call.arguments.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(value) if value.is_object() => value,
        Ok(_) => {
            warn!(tool = %call.name, "Tool arguments are not an object, using {{}}");
            json!({})
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Invalid JSON in tool arguments, using {{}}");
            json!({})
        }
    }
}

/// Send `text` as a single chunk when streaming, then hand it back.
async fn emit_once(tx: Option<&mpsc::Sender<String>>, text: String) -> String {
    if let Some(tx) = tx {
        if !text.is_empty() && tx.send(text.clone()).await.is_err() {
            debug!("Stream receiver dropped before the reply was sent");
        }
    }
    text
}
