//! Cost tracking middleware.
//!
//! Watches `llm:response` events, accumulating request counts, token
//! totals and USD cost for the `/cost` command.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use serde_json::Value;

use crate::core::{event_type, Event, Middleware, Next};

#[derive(Default)]
pub struct CostTracker {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    request_count: AtomicU64,
    /// USD per token; set once from the active model's pricing.
    pricing: Mutex<(f64, f64)>,
}

/// Snapshot for display.
#[derive(Debug, Clone, PartialEq)]
pub struct CostSummary {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pricing(&self, cost_per_input_token: f64, cost_per_output_token: f64) {
        *self.pricing.lock().unwrap_or_else(|e| e.into_inner()) =
            (cost_per_input_token, cost_per_output_token);
    }

    pub fn summary(&self) -> CostSummary {
        let input = self.input_tokens.load(Ordering::Relaxed);
        let output = self.output_tokens.load(Ordering::Relaxed);
        let (cin, cout) = *self.pricing.lock().unwrap_or_else(|e| e.into_inner());
        CostSummary {
            requests: self.request_count.load(Ordering::Relaxed),
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            cost_usd: input as f64 * cin + output as f64 * cout,
        }
    }

    pub fn reset(&self) {
        self.input_tokens.store(0, Ordering::Relaxed);
        self.output_tokens.store(0, Ordering::Relaxed);
        self.request_count.store(0, Ordering::Relaxed);
    }
}

#[async_trait::async_trait]
impl Middleware for CostTracker {
    async fn handle(&self, event: Event, next: Next<'_>) -> Event {
        let event = next.run(event).await;
        if event.event_type == event_type::LLM_RESPONSE {
            let input = event.data.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
            let output = event.data.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
            self.request_count.fetch_add(1, Ordering::Relaxed);
            self.input_tokens.fetch_add(input, Ordering::Relaxed);
            self.output_tokens.fetch_add(output, Ordering::Relaxed);
            log::debug!(
                "LLM call #{}: +{input} in, +{output} out",
                self.request_count.load(Ordering::Relaxed)
            );
        }
        event
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
