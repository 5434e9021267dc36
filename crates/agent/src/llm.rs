use std::time::Duration;

use async_trait::async_trait;
use metabot_core::config::LlmConfig;
use metabot_core::{Role, ToolCall, Turn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompts::TOOL_RESULT_INSTRUCTION;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_PREVIEW_CHARS: usize = 300;

/// One tool as advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides between text and tool calls.
    Auto,
    /// Model must call at least one tool.
    Any,
    /// Tools stay visible but may not be called.
    None,
}

impl ToolChoice {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Any => "any",
            Self::None => "none",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LlmRequest<'a> {
    pub system: &'a str,
    pub transcript: &'a [Turn],
    pub tools: &'a [ToolSchema],
    pub tool_choice: ToolChoice,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), tool_calls: Vec::new() }
    }

    pub fn tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { text: text.into(), tool_calls }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Configuration(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError>;
}

/// Messages API client. Non-streaming; one request per model turn.
pub struct AnthropicClient {
    client: Client,
    api_key: SecretString,
    api_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration("llm.api_key is not set".to_string()))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Configuration(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            client,
            api_key,
            api_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn body(&self, request: &LlmRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": encode_messages(request.transcript),
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
            body["tool_choice"] = json!({ "type": request.tool_choice.wire_name() });
        }
        body
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/messages", self.api_url);
        debug!(
            event_name = "llm.request",
            model = %self.model,
            turns = request.transcript.len(),
            tools = request.tools.len(),
            tool_choice = request.tool_choice.wire_name(),
            "sending model request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            warn!(event_name = "llm.response.error", status = status.as_u16(), body = %body, "model API error");
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let payload: MessagesResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(payload.into_response())
    }
}

/// Maps the transcript onto alternating API messages.
///
/// Tool turns become `tool_result` blocks in a user message, followed by the
/// relevance instruction. Consecutive blocks with the same role share one message.
pub fn encode_messages(transcript: &[Turn]) -> Vec<Value> {
    let mut messages: Vec<(&'static str, Vec<Value>)> = Vec::new();
    let mut in_tool_run = false;

    for turn in transcript {
        if in_tool_run && turn.role != Role::Tool {
            push_block(&mut messages, "user", text_block(TOOL_RESULT_INSTRUCTION));
        }
        in_tool_run = turn.role == Role::Tool;

        match turn.role {
            Role::User => {
                if !turn.content.trim().is_empty() {
                    push_block(&mut messages, "user", text_block(&turn.content));
                }
            }
            Role::Assistant => {
                if !turn.content.trim().is_empty() {
                    push_block(&mut messages, "assistant", text_block(&turn.content));
                }
                for call in &turn.tool_calls {
                    push_block(
                        &mut messages,
                        "assistant",
                        json!({
                            "type": "tool_use",
                            "id": call.id.0,
                            "name": call.name,
                            "input": call.arguments,
                        }),
                    );
                }
            }
            Role::Tool => {
                let (call_id, is_error) = turn
                    .tool_result
                    .as_ref()
                    .map(|result| (result.call_id.0.as_str(), !result.is_success()))
                    .unwrap_or(("", false));
                push_block(
                    &mut messages,
                    "user",
                    json!({
                        "type": "tool_result",
                        "tool_use_id": call_id,
                        "content": turn.content,
                        "is_error": is_error,
                    }),
                );
            }
        }
    }
    if in_tool_run {
        push_block(&mut messages, "user", text_block(TOOL_RESULT_INSTRUCTION));
    }

    messages
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

fn push_block(messages: &mut Vec<(&'static str, Vec<Value>)>, role: &'static str, block: Value) {
    match messages.last_mut() {
        Some((last_role, blocks)) if *last_role == role => blocks.push(block),
        _ => messages.push((role, vec![block])),
    }
}

fn text_block(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn into_response(self) -> LlmResponse {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text } => texts.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input));
                }
                ContentBlock::Other => {}
            }
        }
        LlmResponse { text: texts.join("\n"), tool_calls }
    }
}
