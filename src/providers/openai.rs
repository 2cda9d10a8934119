//! OpenAI Provider Implementation
//!
//! Implements `LLMProvider` for OpenAI-compatible Chat Completions APIs,
//! handling message conversion, tool calls, response parsing and SSE
//! streaming.
//!
//! # Example
//!
//! ```rust,ignore
//! use xiaoclaw::providers::{ChatOptions, LLMProvider, OpenAIProvider};
//! use xiaoclaw::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("Hello!"),
//!     ];
//!     let response = provider
//!         .chat(messages, vec![], None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!     println!("OpenAI: {}", response.content);
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Result, XiaoError};
use crate::session::{Message, Role};

use super::{
    parse_provider_error, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, StreamEvent,
    ToolDefinition, Usage,
};

/// The OpenAI API endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default model to use.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-request timeout for the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// OpenAI API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// A message in OpenAI's format.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    /// Null for an assistant message that only carries tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ============================================================================
// OpenAI API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallResponse {
    id: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
}

// ============================================================================
// Streaming chunk types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates SSE chunks into text deltas and complete tool calls.
///
/// Tool-call arguments arrive as fragments keyed by `index`; they are only
/// surfaced once the stream ends.
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    /// Apply one `data:` payload. Returns the text delta, if any.
    fn apply(&mut self, data: &str) -> Option<String> {
        let chunk: StreamChunk = serde_json::from_str(data).ok()?;
        if let Some(u) = chunk.usage {
            self.usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
        }

        let mut text = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                text.push_str(&content);
            }
            for fragment in choice.delta.tool_calls.into_iter().flatten() {
                let entry = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    entry.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        entry.arguments.push_str(&args);
                    }
                }
            }
        }

        if text.is_empty() {
            None
        } else {
            self.content.push_str(&text);
            Some(text)
        }
    }

    /// Final events once the stream is exhausted.
    fn finish(self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(2);
        if !self.tool_calls.is_empty() {
            let calls = self
                .tool_calls
                .into_values()
                .enumerate()
                .map(|(i, tc)| {
                    let id = if tc.id.is_empty() {
                        format!("call_{}", i)
                    } else {
                        tc.id
                    };
                    let args = if tc.arguments.trim().is_empty() {
                        "{}".to_string()
                    } else {
                        tc.arguments
                    };
                    LLMToolCall::new(&id, &tc.name, &args)
                })
                .collect();
            events.push(StreamEvent::ToolCalls(calls));
        }
        events.push(StreamEvent::Done {
            content: self.content,
            usage: self.usage,
        });
        events
    }
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// OpenAI-compatible LLM provider.
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    model: String,
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider for the official OpenAI endpoint.
    ///
    /// ```
    /// use xiaoclaw::providers::{LLMProvider, OpenAIProvider};
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create a provider for an OpenAI-compatible endpoint (trailing slash removed).
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(api_key, api_base, client)
    }

    /// Create a provider with a custom HTTP client.
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Override the default model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
        stream: bool,
    ) -> OpenAIRequest {
        OpenAIRequest {
            model: model.unwrap_or(&self.model).to_string(),
            messages: convert_messages(messages),
            tools: if tools.is_empty() {
                None
            } else {
                Some(convert_tools(tools))
            },
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, request: &OpenAIRequest) -> Result<reqwest::Response> {
        debug!(model = %request.model, stream = request.stream, "OpenAI request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let error_text = response.text().await.unwrap_or_default();
        let body = match serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
            Ok(parsed) => format!(
                "OpenAI API error: {} - {}",
                parsed.error.r#type.unwrap_or_default(),
                parsed.error.message
            ),
            Err(_) => format!("OpenAI API error: {}", error_text),
        };
        Err(XiaoError::from(parse_provider_error(status, &body)))
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let tool_calls = msg.tool_calls.map(|tcs| {
                tcs.into_iter()
                    .map(|tc| OpenAIToolCallRequest {
                        id: tc.id,
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            });

            OpenAIMessage {
                role: msg.role.to_string(),
                content: if msg.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(msg.content)
                },
                tool_calls,
                tool_call_id: msg.tool_call_id,
                name: if msg.role == Role::Tool { msg.name } else { None },
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|t| OpenAITool {
            r#type: "function".to_string(),
            function: OpenAIFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

fn convert_response(response: OpenAIResponse) -> LLMResponse {
    let (content, tool_calls) = match response.choices.into_iter().next() {
        Some(c) => {
            let content = c.message.content.unwrap_or_default();
            let tool_calls = c
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| LLMToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
                .collect();
            (content, tool_calls)
        }
        None => (String::new(), Vec::new()),
    };

    let llm_response = LLMResponse::with_tools(&content, tool_calls);
    match response.usage {
        Some(usage) => {
            llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens))
        }
        None => llm_response,
    }
}

/// Strip the `data:` prefix of an SSE line; `None` for anything else.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Splits a byte stream into lines. Bytes are only decoded once a full line
/// has arrived, so a UTF-8 sequence split across network chunks survives.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed, trimmed.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, tools, model, options, false);
        let response = self.send(&request).await?;

        let parsed: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| XiaoError::Provider(format!("Failed to parse OpenAI response: {}", e)))?;

        info!(model = %request.model, "OpenAI response received");
        Ok(convert_response(parsed))
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let request = self.build_request(messages, tools, model, options, true);
        let response = self.send(&request).await?;

        let (tx, rx) = mpsc::channel::<StreamEvent>(32);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut acc = StreamAccumulator::default();
            let mut lines = LineBuffer::default();
            tokio::pin!(byte_stream);

            'read: while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error(XiaoError::Provider(format!(
                                "Stream read error: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };
                for line in lines.push(&bytes) {
                    let Some(data) = sse_data(&line) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'read;
                    }
                    if let Some(text) = acc.apply(data) {
                        if tx.send(StreamEvent::Delta(text)).await.is_err() {
                            // Receiver dropped: caller abandoned the stream.
                            return;
                        }
                    }
                }
            }

            for event in acc.finish() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Tests
// ============================================================================
