//! Provider types for xiaoclaw
//!
//! Defines the `LLMProvider` trait, chat options, responses and the
//! streaming event protocol consumed by the agent loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, XiaoError};
use crate::session::{Message, ToolCall};

/// Definition of a tool that can be called by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use xiaoclaw::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "web_search",
    ///     "Search the web for information",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "query": { "type": "string", "description": "Search query" }
    ///         },
    ///         "required": ["query"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "web_search");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Render in the OpenAI function-calling shape.
    pub fn to_openai_function(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Incremental output of a streaming chat request.
#[derive(Debug)]
pub enum StreamEvent {
    /// A piece of assistant text
    Delta(String),
    /// The model asked for tools instead of (or after) text
    ToolCalls(Vec<LLMToolCall>),
    /// The stream finished; `content` is the full assembled text
    Done {
        content: String,
        usage: Option<Usage>,
    },
    /// The stream failed mid-way
    Error(XiaoError),
}

/// Trait for LLM providers.
///
/// The provider translates between xiaoclaw's message format and its own
/// wire format. Only `chat` is required; `chat_stream` degrades to it.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request to the LLM.
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Send a chat request and receive the answer incrementally.
    ///
    /// The default implementation performs a regular [`chat`](Self::chat)
    /// and replays the response as a single `Delta` (or `ToolCalls`)
    /// followed by `Done`.
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let response = self.chat(messages, tools, model, options).await?;
        let (tx, rx) = mpsc::channel(4);

        if response.has_tool_calls() {
            let _ = tx.send(StreamEvent::ToolCalls(response.tool_calls)).await;
        } else if !response.content.is_empty() {
            let _ = tx.send(StreamEvent::Delta(response.content.clone())).await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                content: response.content,
                usage: response.usage,
            })
            .await;

        Ok(rx)
    }

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// Options for chat completion requests.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,
    /// Stop sequences that halt generation
    pub stop: Option<Vec<String>>,
}

impl ChatOptions {
    /// Create new default chat options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    ///
    /// ```
    /// use xiaoclaw::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(1000);
    /// assert_eq!(options.max_tokens, Some(1000));
    /// ```
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set stop sequences that will halt generation.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Response from an LLM chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Tool calls made by the LLM (if any)
    pub tool_calls: Vec<LLMToolCall>,
    /// Token usage information (if available)
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// Create a simple text response with no tool calls.
    ///
    /// ```
    /// use xiaoclaw::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert_eq!(response.content, "Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            tool_calls: vec![],
            usage: None,
        }
    }

    /// Create a response with tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            usage: None,
        }
    }

    /// Check if this response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Set usage information for this response.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A tool call made by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl LLMToolCall {
    /// Create a new tool call.
    ///
    /// ```
    /// use xiaoclaw::providers::LLMToolCall;
    ///
    /// let call = LLMToolCall::new("call_123", "web_search", r#"{"query": "rust"}"#);
    /// assert_eq!(call.name, "web_search");
    /// ```
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    /// Parse the arguments as a specific type.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.arguments)
    }
}

impl From<&LLMToolCall> for ToolCall {
    fn from(call: &LLMToolCall) -> Self {
        ToolCall::new(&call.id, &call.name, &call.arguments)
    }
}

/// Token usage information from a completion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Create new usage information; the total is derived.
    ///
    /// ```
    /// use xiaoclaw::providers::Usage;
    ///
    /// let usage = Usage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(LLMResponse);

    #[async_trait]
    impl LLMProvider for Canned {
        async fn chat(
            &self,
            _messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            Ok(self.0.clone())
        }

        fn default_model(&self) -> &str {
            "canned"
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_llm_response_with_tools() {
        let tool_call = LLMToolCall::new("call_1", "search", r#"{"query": "rust"}"#);
        let response = LLMResponse::with_tools("Searching...", vec![tool_call]);
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls[0].name, "search");
    }

    #[test]
    fn test_llm_response_with_usage() {
        let response = LLMResponse::text("Hello").with_usage(Usage::new(100, 50));
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_chat_options_builder() {
        let options = ChatOptions::new()
            .with_max_tokens(1000)
            .with_temperature(0.7)
            .with_stop(vec!["END".to_string()]);
        assert_eq!(options.max_tokens, Some(1000));
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(options.stop.unwrap()[0], "END");
    }

    #[test]
    fn test_openai_function_shape() {
        let tool = ToolDefinition::new("read", "Read a file", serde_json::json!({"type": "object"}));
        let value = tool.to_openai_function();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "read");
        assert_eq!(value["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_tool_call_conversion() {
        let call = LLMToolCall::new("c1", "exec", r#"{"command":"ls"}"#);
        let converted: ToolCall = (&call).into();
        assert_eq!(converted.id, "c1");
        assert_eq!(converted.arguments, call.arguments);
    }

    #[tokio::test]
    async fn test_default_stream_replays_text() {
        let provider = Canned(LLMResponse::text("hi there"));
        let mut rx = provider
            .chat_stream(vec![], vec![], None, ChatOptions::new())
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(StreamEvent::Delta(t)) if t == "hi there"));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Done { content, .. }) if content == "hi there"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_default_stream_surfaces_tool_calls() {
        let provider = Canned(LLMResponse::with_tools(
            "",
            vec![LLMToolCall::new("c1", "read", "{}")],
        ));
        let mut rx = provider
            .chat_stream(vec![], vec![], None, ChatOptions::new())
            .await
            .unwrap();

        match rx.recv().await {
            Some(StreamEvent::ToolCalls(calls)) => assert_eq!(calls.len(), 1),
            other => panic!("expected tool calls, got {:?}", other),
        }
    }
}
