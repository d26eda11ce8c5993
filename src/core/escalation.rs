//! Escalation bus — lets background agents ask the user a question.
//!
//! Mirrors the approval flow: a pending single-shot channel per
//! request, an `agent:escalation` event for the interactive side, and
//! a timeout with a safe fallback so a worker never hangs on an absent
//! user.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use serde_json::json;
use tokio::sync::oneshot;

use super::bus::EventBus;
use super::events::{event_type, Event};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Returned to a worker when nobody answers in time.
pub const NO_ANSWER_FALLBACK: &str = "[No answer received — proceeding with best judgement]";

pub struct EscalationBus {
    bus: Arc<EventBus>,
    timeout: Duration,
    pending: Mutex<HashMap<String, oneshot::Sender<String>>>,
    counter: AtomicU64,
}

impl EscalationBus {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_timeout(bus, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(bus: Arc<EventBus>, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            pending: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    // ── Worker-side API ──────────────────────────────────────────────────────

    /// Ask the user a question and block until an answer arrives or the
    /// timeout expires. On timeout, returns [`NO_ANSWER_FALLBACK`] so
    /// the worker proceeds rather than hanging.
    pub async fn ask_manager(&self, from_agent: &str, question: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let escalation_id = format!("esc_{n}");

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(escalation_id.clone(), tx);

        log::info!("escalation {escalation_id} from '{from_agent}': {}", truncate(question, 80));

        self.bus
            .emit(Event::new(event_type::AGENT_ESCALATION, from_agent).with_data(json!({
                "escalation_id": escalation_id,
                "from_agent": from_agent,
                "question": question,
            })))
            .await;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(answer)) => answer,
            // Sender dropped without an answer.
            Ok(Err(_)) => NO_ANSWER_FALLBACK.to_string(),
            Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&escalation_id);
                log::warn!("escalation {escalation_id} timed out after {:?}", self.timeout);
                NO_ANSWER_FALLBACK.to_string()
            }
        }
    }

    // ── Interactive-side API ─────────────────────────────────────────────────

    /// Resolve a pending escalation with the user's answer.
    ///
    /// Returns `false` for an unknown id; a second resolve of the same
    /// id is a no-op.
    pub fn resolve_escalation(&self, escalation_id: &str, answer: &str) -> bool {
        let tx = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(escalation_id);
        match tx {
            Some(tx) => tx.send(answer.to_string()).is_ok(),
            None => {
                log::debug!("escalation {escalation_id} not found (already resolved?)");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ask_and_resolve_round_trip() {
        let bus = Arc::new(EventBus::new());
        let esc = Arc::new(EscalationBus::new(Arc::clone(&bus)));

        // The interactive side answers as soon as the event arrives.
        let esc_h = Arc::clone(&esc);
        bus.on(event_type::AGENT_ESCALATION, move |e| {
            let esc = Arc::clone(&esc_h);
            async move {
                let id = e.data_str("escalation_id").unwrap_or_default().to_string();
                // Resolve from a spawned task so ask_manager has returned to its await.
                tokio::spawn(async move {
                    assert!(esc.resolve_escalation(&id, "last 7 days"));
                });
                Ok(())
            }
        });

        let answer = esc.ask_manager("worker:research", "Which date range?").await;
        assert_eq!(answer, "last 7 days");
        assert_eq!(esc.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_returns_fallback_and_later_resolve_is_noop() {
        let bus = Arc::new(EventBus::new());
        let esc = EscalationBus::with_timeout(bus, Duration::from_millis(20));

        let answer = esc.ask_manager("worker:x", "anyone there?").await;
        assert_eq!(answer, NO_ANSWER_FALLBACK);
        assert!(!esc.resolve_escalation("esc_1", "too late"));
    }

    #[tokio::test]
    async fn unknown_id_returns_false() {
        let bus = Arc::new(EventBus::new());
        let esc = EscalationBus::new(bus);
        assert!(!esc.resolve_escalation("esc_999", "hello"));
    }

    #[tokio::test]
    async fn double_resolve_is_noop() {
        let bus = Arc::new(EventBus::new());
        let esc = Arc::new(EscalationBus::new(Arc::clone(&bus)));

        let esc_bg = Arc::clone(&esc);
        let ask = tokio::spawn(async move { esc_bg.ask_manager("worker:y", "q?").await });
        // Give ask_manager time to register the pending entry.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(esc.resolve_escalation("esc_1", "first"));
        assert!(!esc.resolve_escalation("esc_1", "second"));
        assert_eq!(ask.await.unwrap(), "first");
    }
}
