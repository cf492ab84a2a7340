//! `OpenAI`-compatible chat completions with server-sent event streaming

use super::types::{ContentBlock, LlmMessage, LlmRequest, MessageRole, StreamPart, Usage};
use super::{LlmError, LlmService, LlmStream};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiService {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiService {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, LlmError> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: format!("{base}/chat/completions"),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            let system_text = request
                .system
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            messages.push(ChatMessage::plain("system", system_text));
        }

        for msg in &request.messages {
            messages.extend(translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| ChatTool {
                        r#type: "function".to_string(),
                        function: ChatFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }
}

/// Translate one message. Tool results become separate `tool` messages.
fn translate_message(msg: &LlmMessage) -> Vec<ChatMessage> {
    let role = match msg.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut messages = Vec::new();
    let mut tool_results = Vec::new();

    for block in &msg.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ChatToolCall {
                id: id.clone(),
                r#type: "function".to_string(),
                function: ChatFunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => tool_results.push(ChatMessage {
                role: "tool".to_string(),
                content: Some(if *is_error {
                    format!("Error: {content}")
                } else {
                    content.clone()
                }),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            }),
        }
    }

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        messages.push(ChatMessage {
            role: role.to_string(),
            content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }
    messages.extend(tool_results);
    messages
}

#[async_trait]
impl LlmService for OpenAiService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let body = self.translate_request(request);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(decode_body(body))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

struct BodyState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    lines: SseLineBuffer,
    decoder: ChunkDecoder,
    pending: VecDeque<Result<StreamPart, LlmError>>,
    closed: bool,
}

/// Turn a raw SSE body into stream parts. The stream ends after the first
/// error or after the finish part.
fn decode_body(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> LlmStream {
    let state = BodyState {
        body,
        lines: SseLineBuffer::default(),
        decoder: ChunkDecoder::default(),
        pending: VecDeque::new(),
        closed: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.closed {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for payload in state.lines.push(&bytes) {
                        match state.decoder.decode(&payload) {
                            Ok(parts) => state.pending.extend(parts.into_iter().map(Ok)),
                            Err(e) => {
                                state.pending.push_back(Err(e));
                                state.closed = true;
                                break;
                            }
                        }
                        if state.decoder.is_finished() {
                            state.closed = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(LlmError::network(format!("Stream interrupted: {e}"))));
                    state.closed = true;
                }
                None => {
                    state.pending.extend(state.decoder.finish().into_iter().map(Ok));
                    state.closed = true;
                }
            }
        }
    }))
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Lines are buffered as bytes so multi-byte characters split across
/// chunks survive.
#[derive(Default)]
struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(newline) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(&['\n', '\r'][..]);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds chat completion chunks into stream parts.
#[derive(Default)]
struct ChunkDecoder {
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: Usage,
    finished: bool,
}

impl ChunkDecoder {
    fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode(&mut self, payload: &str) -> Result<Vec<StreamPart>, LlmError> {
        if payload == "[DONE]" {
            return Ok(self.finish());
        }
        if let Ok(error) = serde_json::from_str::<ErrorResponse>(payload) {
            return Err(LlmError::server_error(error.error.message));
        }
        let chunk: ChatChunk = serde_json::from_str(payload)
            .map_err(|e| LlmError::unknown(format!("Failed to parse chunk: {e} - {payload}")))?;

        if let Some(usage) = chunk.usage {
            self.usage = Usage {
                input_tokens: u64::from(usage.prompt_tokens),
                output_tokens: u64::from(usage.completion_tokens),
            };
        }

        let mut parts = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                parts.push(StreamPart::TextDelta(text));
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let call = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }
            if choice.finish_reason.as_deref() == Some("tool_calls") {
                parts.extend(self.flush_tool_calls());
            }
        }
        Ok(parts)
    }

    /// Emit any buffered tool calls and the finish part, once.
    fn finish(&mut self) -> Vec<StreamPart> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut parts = self.flush_tool_calls();
        parts.push(StreamPart::Finish { usage: self.usage });
        parts
    }

    fn flush_tool_calls(&mut self) -> Vec<StreamPart> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let input = if call.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
                        tracing::warn!(
                            error = %e,
                            arguments = %call.arguments,
                            "Failed to parse tool call arguments"
                        );
                        serde_json::json!({})
                    })
                };
                StreamPart::ToolCall {
                    id: call.id,
                    name: call.name,
                    input,
                }
            })
            .collect()
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatToolCall {
    id: String,
    r#type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
