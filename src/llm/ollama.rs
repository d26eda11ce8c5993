//! Ollama provider — streaming chat over the local Ollama HTTP API.
//!
//! Streams NDJSON from `/api/chat` (Ollama 0.4+ for tool calling) and
//! converts between the runtime's message format and Ollama's.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::core::types::{ArgMap, LlmChunk, Message, ModelInfo, StopReason, ToolCall, ToolSpec};
use crate::core::ArcError;

use super::provider::{estimate_tokens, ChunkStream, GenerateRequest, LlmProvider};

pub struct OllamaProvider {
    base_url: String,
    model: String,
    context_window: usize,
    max_output_tokens: usize,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            context_window: 128_000,
            max_output_tokens: 8_192,
            // LLMs can take a while; only bound the connect phase.
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_limits(mut self, context_window: usize, max_output_tokens: usize) -> Self {
        self.context_window = context_window;
        self.max_output_tokens = max_output_tokens;
        self
    }

    // ── Format conversion ────────────────────────────────────────────────────

    fn convert_message(msg: &Message) -> Value {
        let content = msg.content.clone().unwrap_or_default();
        match &msg.tool_calls {
            Some(calls) if msg.role == "assistant" => json!({
                "role": msg.role,
                "content": content,
                "tool_calls": calls.iter().map(|tc| json!({
                    "function": { "name": tc.name, "arguments": tc.arguments }
                })).collect::<Vec<_>>(),
            }),
            _ => json!({ "role": msg.role, "content": content }),
        }
    }

    fn convert_tool_spec(spec: &ToolSpec) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": spec.name,
                "description": spec.description,
                "parameters": spec.parameters,
            },
        })
    }

    fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
        message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let func = tc.get("function")?;
                        let name = func.get("name")?.as_str()?.to_string();
                        let arguments = func
                            .get("arguments")
                            .and_then(Value::as_object)
                            .cloned()
                            .unwrap_or_else(ArgMap::new);
                        Some(ToolCall::new(name, arguments))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<ChunkStream, ArcError> {
        let mut options = json!({ "temperature": request.temperature });
        if let Some(max) = request.max_tokens {
            options["num_predict"] = json!(max);
        }
        if let Some(stop) = &request.stop_sequences {
            options["stop"] = json!(stop);
        }

        let mut payload = json!({
            "model": self.model,
            "messages": request.messages.iter().map(Self::convert_message).collect::<Vec<_>>(),
            "stream": true,
            "options": options,
        });
        if let Some(tools) = &request.tools {
            payload["tools"] = Value::Array(tools.iter().map(Self::convert_tool_spec).collect());
        }

        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            if e.is_connect() {
                ArcError::llm_retryable(format!(
                    "Cannot connect to Ollama at {} — is the LLM server running? ({e})",
                    self.base_url
                ))
            } else if e.is_timeout() {
                ArcError::llm_retryable(format!("Ollama request timed out: {e}"))
            } else {
                ArcError::llm(format!("Ollama request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArcError::Llm {
                message: format!("Ollama API error ({status}): {body}"),
                retryable: status.is_server_error(),
            });
        }

        // Decode NDJSON lines off the byte stream into chunks. A reader
        // task keeps the response body alive; the stream side just
        // drains the channel.
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<LlmChunk, ArcError>>();
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = bytes::BytesMut::new();

            while let Some(part) = body.next().await {
                let chunk_bytes = match part {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ArcError::llm_retryable(format!("Ollama stream error: {e}"))));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk_bytes);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.split_to(pos + 1);
                    let Ok(data) = serde_json::from_slice::<Value>(&line) else {
                        continue;
                    };

                    if let Some(err) = data.get("error").and_then(Value::as_str) {
                        let _ = tx.send(Err(ArcError::llm_retryable(format!("Ollama stream error: {err}"))));
                        return;
                    }

                    let empty = json!({});
                    let message = data.get("message").unwrap_or(&empty);
                    let done = data.get("done").and_then(Value::as_bool).unwrap_or(false);
                    let input_tokens = data.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0);
                    let output_tokens = data.get("eval_count").and_then(Value::as_u64).unwrap_or(0);

                    let tool_calls = Self::parse_tool_calls(message);
                    if !tool_calls.is_empty() {
                        let _ = tx.send(Ok(LlmChunk {
                            tool_calls,
                            stop_reason: Some(StopReason::ToolUse),
                            input_tokens,
                            output_tokens,
                            ..LlmChunk::default()
                        }));
                        return;
                    }

                    if let Some(text) = message.get("content").and_then(Value::as_str) {
                        if !text.is_empty() {
                            let _ = tx.send(Ok(LlmChunk::text(text)));
                        }
                    }

                    if done {
                        let _ = tx.send(Ok(LlmChunk::done(StopReason::Complete, input_tokens, output_tokens)));
                        return;
                    }
                }
            }
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn count_tokens(&self, messages: &[Message]) -> usize {
        estimate_tokens(messages)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "ollama".to_string(),
            model: self.model.clone(),
            context_window: self.context_window,
            max_output_tokens: self.max_output_tokens,
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            supports_tools: true,
        }
    }

    async fn close(&self) {
        // reqwest tears down its connection pool when the client drops;
        // nothing else is held open.
        log::debug!("ollama provider closed");
    }
}
