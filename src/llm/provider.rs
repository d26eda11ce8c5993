//! The LLM provider contract.
//!
//! The agent loop only ever talks to this trait; swap providers by
//! changing one config line. The stream contract: the **last** chunk
//! carries a non-null `stop_reason` and the final token counts.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::core::types::{LlmChunk, Message, ModelInfo, ToolSpec};
use crate::core::ArcError;

/// A lazy sequence of streaming chunks.
pub type ChunkStream = BoxStream<'static, Result<LlmChunk, ArcError>>;

/// Parameters for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolSpec>>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
}

impl GenerateRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Option<Vec<ToolSpec>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Abstraction over a streaming chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a generation and return the chunk stream.
    ///
    /// Errors before the first chunk (connection refused, bad request)
    /// are returned directly; mid-stream errors arrive as `Err` items.
    async fn generate(&self, request: GenerateRequest) -> Result<ChunkStream, ArcError>;

    /// Estimate the token count of a transcript. Within 10-20% is fine;
    /// the composer only uses it for budget decisions.
    fn count_tokens(&self, messages: &[Message]) -> usize;

    /// Static model metadata. May be cached by callers.
    fn model_info(&self) -> ModelInfo;

    /// Release any held connections. Called once from the shutdown
    /// cascade; the default is a no-op for providers with nothing to
    /// release.
    async fn close(&self) {}
}

/// Shared chars/4 token estimate used by providers without a tokenizer.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let mut chars = 0usize;
    for msg in messages {
        if let Some(c) = &msg.content {
            chars += c.len();
        }
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                chars += serde_json::to_string(&call.arguments).map(|s| s.len()).unwrap_or(0);
            }
        }
    }
    (chars / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_scales_with_content() {
        let short = vec![Message::user("hi")];
        let long = vec![Message::user("x".repeat(4000))];
        assert!(estimate_tokens(&long) > estimate_tokens(&short));
        assert_eq!(estimate_tokens(&long), 1000);
    }

    #[test]
    fn token_estimate_counts_tool_call_arguments() {
        let mut args = crate::core::types::ArgMap::new();
        args.insert("query".into(), serde_json::Value::String("y".repeat(400)));
        let call = crate::core::types::ToolCall::new("search", args);
        let msg = Message::assistant(None, Some(vec![call]));
        assert!(estimate_tokens(&[msg]) > 100);
    }
}
