//! Mock LLM provider for tests.
//!
//! Returns pre-scripted chunk sequences without any network I/O and
//! records every call for assertions. Each `generate` call pops the
//! next scripted response; when the queue runs dry a fixed default
//! text response is produced.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use futures::StreamExt;

use crate::core::types::{ArgMap, LlmChunk, Message, ModelInfo, StopReason, ToolCall, ToolSpec};
use crate::core::ArcError;

use super::provider::{estimate_tokens, ChunkStream, GenerateRequest, LlmProvider};

const DEFAULT_RESPONSE: &str = "I'm a mock model. Script me with set_response().";

pub struct MockProvider {
    model: String,
    context_window: usize,
    responses: Mutex<VecDeque<Vec<LlmChunk>>>,
    /// When the script queue is empty, fail instead of replying.
    fail_when_empty: Mutex<Option<String>>,

    // Call tracking
    pub call_count: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
    last_tools: Mutex<Option<Vec<ToolSpec>>>,
    closed: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            context_window: 8_192,
            responses: Mutex::new(VecDeque::new()),
            fail_when_empty: Mutex::new(None),
            call_count: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
            last_tools: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    // ── Scripting ────────────────────────────────────────────────────────────

    /// Queue a plain text response for the next `generate` call.
    pub fn set_response(&self, text: &str) {
        let chunks = vec![
            LlmChunk::text(text),
            LlmChunk::done(StopReason::Complete, (text.len() / 4) as u64, (text.len() / 4) as u64),
        ];
        self.push(chunks);
    }

    /// Queue several text responses for successive calls.
    pub fn set_responses(&self, texts: &[&str]) {
        for t in texts {
            self.set_response(t);
        }
    }

    /// Queue a tool-call turn.
    pub fn set_tool_call(&self, tool_name: &str, arguments: ArgMap) {
        let call = ToolCall::new(tool_name, arguments);
        self.push(vec![LlmChunk {
            tool_calls: vec![call],
            stop_reason: Some(StopReason::ToolUse),
            input_tokens: 50,
            output_tokens: 25,
            ..LlmChunk::default()
        }]);
    }

    /// Queue an arbitrary chunk sequence.
    pub fn push(&self, chunks: Vec<LlmChunk>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(chunks);
    }

    /// Make `generate` return an error once the script queue is empty.
    pub fn fail_when_empty(&self, message: &str) {
        *self.fail_when_empty.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    // ── Assertions ───────────────────────────────────────────────────────────

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_tools(&self) -> Option<Vec<ToolSpec>> {
        self.last_tools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<ChunkStream, ArcError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap_or_else(|e| e.into_inner()) = request.messages.clone();
        *self.last_tools.lock().unwrap_or_else(|e| e.into_inner()) = request.tools.clone();

        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let chunks = match scripted {
            Some(chunks) => chunks,
            None => {
                if let Some(msg) = self
                    .fail_when_empty
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone()
                {
                    return Err(ArcError::llm(msg));
                }
                vec![
                    LlmChunk::text(DEFAULT_RESPONSE),
                    LlmChunk::done(StopReason::Complete, 10, 10),
                ]
            }
        };

        Ok(tokio_stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    fn count_tokens(&self, messages: &[Message]) -> usize {
        estimate_tokens(messages)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "mock".to_string(),
            model: self.model.clone(),
            context_window: self.context_window,
            max_output_tokens: 1_024,
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            supports_tools: true,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(provider: &MockProvider, messages: Vec<Message>) -> Vec<LlmChunk> {
        let stream = provider
            .generate(GenerateRequest::new(messages))
            .await
            .unwrap();
        stream.map(|c| c.unwrap()).collect().await
    }

    #[tokio::test]
    async fn scripted_response_is_streamed() {
        let mock = MockProvider::new();
        mock.set_response("Hello");
        let chunks = collect(&mock, vec![Message::user("hi")]).await;
        assert_eq!(chunks[0].text, "Hello");
        assert_eq!(chunks.last().unwrap().stop_reason, Some(StopReason::Complete));
    }

    #[tokio::test]
    async fn responses_pop_in_order() {
        let mock = MockProvider::new();
        mock.set_responses(&["one", "two"]);
        let a = collect(&mock, vec![Message::user("1")]).await;
        let b = collect(&mock, vec![Message::user("2")]).await;
        assert_eq!(a[0].text, "one");
        assert_eq!(b[0].text, "two");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn empty_queue_yields_default() {
        let mock = MockProvider::new();
        let chunks = collect(&mock, vec![Message::user("hi")]).await;
        assert_eq!(chunks[0].text, DEFAULT_RESPONSE);
    }

    #[tokio::test]
    async fn tool_call_turn_has_tool_use_stop_reason() {
        let mock = MockProvider::new();
        let mut args = ArgMap::new();
        args.insert("name".into(), serde_json::json!("World"));
        mock.set_tool_call("greet", args);

        let chunks = collect(&mock, vec![Message::user("greet")]).await;
        assert_eq!(chunks[0].stop_reason, Some(StopReason::ToolUse));
        assert_eq!(chunks[0].tool_calls[0].name, "greet");
    }

    #[tokio::test]
    async fn call_tracking_records_messages_and_tools() {
        let mock = MockProvider::new();
        mock.set_response("ok");
        let spec = ToolSpec {
            name: "greet".into(),
            description: "d".into(),
            parameters: serde_json::json!({"type": "object"}),
            required_capabilities: Default::default(),
        };
        let req = GenerateRequest::new(vec![Message::user("hi")]).with_tools(Some(vec![spec]));
        let _ = mock.generate(req).await.unwrap();

        assert_eq!(mock.last_messages()[0].role, "user");
        assert_eq!(mock.last_tools().unwrap()[0].name, "greet");
    }

    #[tokio::test]
    async fn fail_when_empty_errors() {
        let mock = MockProvider::new();
        mock.fail_when_empty("connection refused");
        let err = mock.generate(GenerateRequest::new(vec![])).await.err().unwrap();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn close_marks_the_provider_closed() {
        let mock = MockProvider::new();
        assert!(!mock.is_closed());
        mock.close().await;
        assert!(mock.is_closed());
    }
}
