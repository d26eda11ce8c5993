//! `VirtualPlatform` — silent message channel for background agents.
//!
//! Workers, experts and scheduler sub-agents run here instead of the
//! interactive platform, so their output is captured in memory and
//! never touches the terminal. Only the main agent writes to the user.
//!
//! The input queue carries `(text, reply)` pairs; the single run loop
//! answers strictly in queue order, so concurrent `send_message`
//! callers are serialized rather than interleaved.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tokio::sync::{mpsc, oneshot};

use crate::agent::loop_::ChunkSink;
use crate::core::ArcError;

use super::MessageHandler;

enum Inbound {
    Message {
        text: String,
        reply: oneshot::Sender<String>,
    },
    Stop,
}

pub struct VirtualPlatform {
    name: String,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    running: AtomicBool,
    last_output: Mutex<String>,
}

impl VirtualPlatform {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: name.into(),
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            running: AtomicBool::new(false),
            last_output: Mutex::new(String::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The last collected response (useful for tests).
    pub fn last_output(&self) -> String {
        self.last_output.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // ── Run loop ─────────────────────────────────────────────────────────────

    /// Consume the input queue, feeding each message to `handler` and
    /// buffering every yielded chunk. A handler error appends
    /// `"[Error: …]"` to the buffer; the reply is always sent. Exits on
    /// [`VirtualPlatform::stop`] or when all senders are gone.
    pub async fn run<H: MessageHandler>(self: Arc<Self>, mut handler: H) {
        // Second run() on the same platform has no receiver to take.
        let Some(mut rx) = self.rx.lock().await.take() else {
            log::warn!("virtual platform '{}' already consumed its queue", self.name);
            return;
        };
        self.running.store(true, Ordering::SeqCst);
        log::debug!("virtual platform '{}' started", self.name);

        while let Some(inbound) = rx.recv().await {
            let (text, reply) = match inbound {
                Inbound::Stop => break,
                Inbound::Message { text, reply } => (text, reply),
            };

            let buffer = drive_handler(&mut handler, &text).await;
            *self.last_output.lock().unwrap_or_else(|e| e.into_inner()) = buffer.clone();
            let _ = reply.send(buffer);
        }

        self.running.store(false, Ordering::SeqCst);
        log::debug!("virtual platform '{}' stopped", self.name);
    }

    /// Signal the run loop to exit cleanly.
    pub async fn stop(&self) {
        let _ = self.tx.send(Inbound::Stop);
    }

    // ── Programmatic message routing ─────────────────────────────────────────

    /// Send a message and wait for the complete buffered response.
    pub async fn send_message(&self, text: &str) -> Result<String, ArcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Inbound::Message {
                text: text.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| ArcError::Platform(format!("virtual platform '{}' is not running", self.name)))?;
        reply_rx
            .await
            .map_err(|_| ArcError::Platform(format!("virtual platform '{}' stopped mid-message", self.name)))
    }
}

/// Run the handler for one message, draining its chunk stream into a
/// buffer as it produces text.
async fn drive_handler<H: MessageHandler>(handler: &mut H, text: &str) -> String {
    let (chunk_tx, mut chunk_rx): (ChunkSink, _) = mpsc::unbounded_channel();
    let mut buffer = String::new();

    {
        let handle_fut = handler.handle(text, &chunk_tx);
        tokio::pin!(handle_fut);
        let result = loop {
            tokio::select! {
                r = &mut handle_fut => break r,
                Some(chunk) = chunk_rx.recv() => buffer.push_str(&chunk),
            }
        };
        if let Err(e) = result {
            log::error!("virtual platform handler error: {e}");
            buffer.push_str(&format!("[Error: {e}]"));
        }
    }

    // Chunks sent in the handler's final poll may still be queued.
    while let Ok(chunk) = chunk_rx.try_recv() {
        buffer.push_str(&chunk);
    }
    buffer
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&mut self, input: &str, sink: &ChunkSink) -> Result<String, ArcError> {
            for word in input.split_whitespace() {
                let _ = sink.send(format!("{word} "));
            }
            Ok(input.to_string())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl MessageHandler for FailingHandler {
        async fn handle(&mut self, _input: &str, sink: &ChunkSink) -> Result<String, ArcError> {
            let _ = sink.send("partial ".to_string());
            Err(ArcError::llm("stream broke"))
        }
    }

    #[tokio::test]
    async fn send_message_returns_buffered_chunks() {
        let platform = VirtualPlatform::new("test");
        let task = tokio::spawn(Arc::clone(&platform).run(EchoHandler));

        let response = platform.send_message("hello silent world").await.unwrap();
        assert_eq!(response, "hello silent world ");
        assert_eq!(platform.last_output(), "hello silent world ");

        platform.stop().await;
        task.await.unwrap();
        assert!(!platform.is_running());
    }

    #[tokio::test]
    async fn handler_error_is_appended_to_buffer() {
        let platform = VirtualPlatform::new("failing");
        let task = tokio::spawn(Arc::clone(&platform).run(FailingHandler));

        let response = platform.send_message("anything").await.unwrap();
        assert!(response.starts_with("partial "));
        assert!(response.contains("[Error:"));

        platform.stop().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn sequential_turns_are_answered_in_order() {
        let platform = VirtualPlatform::new("seq");
        let task = tokio::spawn(Arc::clone(&platform).run(EchoHandler));

        let first = platform.send_message("one").await.unwrap();
        let second = platform.send_message("two").await.unwrap();
        assert_eq!(first, "one ");
        assert_eq!(second, "two ");

        platform.stop().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_send_yields_platform_error() {
        let platform = VirtualPlatform::new("stopped");
        let task = tokio::spawn(Arc::clone(&platform).run(EchoHandler));
        platform.stop().await;
        task.await.unwrap();

        // The queue still accepts the message but the loop is gone; the
        // reply channel is dropped.
        let result = platform.send_message("late").await;
        assert!(result.is_err());
    }
}
