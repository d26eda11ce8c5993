//! Interactive approval flow.
//!
//! Bridges the non-interactive security check to the interactive
//! platform: a pending single-shot channel per request, a
//! `security:approval` event for the platform to render, and a timeout
//! that converts silence into a denial.

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

use crate::core::types::{ApprovalResponse, ArgMap, SecurityDecision, ToolSpec};
use crate::core::{event_type, Event, EventBus};

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ApprovalFlow {
    bus: Arc<EventBus>,
    timeout: Duration,
    pending: Mutex<HashMap<String, oneshot::Sender<ApprovalResponse>>>,
    counter: AtomicU64,
}

impl ApprovalFlow {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_timeout(bus, DEFAULT_APPROVAL_TIMEOUT)
    }

    pub fn with_timeout(bus: Arc<EventBus>, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            pending: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Request user approval for a tool call.
    ///
    /// Emits `security:approval` and waits for [`resolve_approval`],
    /// bounded by the configured timeout. On timeout the pending entry
    /// is dropped and a denial with reason `"approval_timeout"` is
    /// returned; a straggling resolve afterwards is a no-op.
    ///
    /// [`resolve_approval`]: ApprovalFlow::resolve_approval
    pub async fn request_approval(&self, spec: &ToolSpec, arguments: &ArgMap) -> SecurityDecision {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = format!("approval_{n}");

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id.clone(), tx);

        let capabilities: Vec<&str> = spec
            .required_capabilities
            .iter()
            .map(|c| c.as_str())
            .collect();

        self.bus
            .emit(Event::new(event_type::SECURITY_APPROVAL, "security").with_data(json!({
                "request_id": request_id,
                "tool_name": spec.name,
                "tool_description": spec.description,
                "arguments": arguments,
                "capabilities": capabilities,
            })))
            .await;
        log::debug!("approval requested: {request_id} for {}", spec.name);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => {
                log::debug!("approval response: {request_id} = {}", response.as_str());
                decision_for(response)
            }
            // Sender dropped without an answer — treat as denial.
            Ok(Err(_)) => SecurityDecision::deny("user:denied"),
            Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&request_id);
                log::warn!("approval timeout: {request_id}");
                SecurityDecision::deny("approval_timeout")
            }
        }
    }

    /// Resolve a pending approval request with the user's choice.
    ///
    /// Returns `false` for an unknown id or an already-resolved
    /// request.
    pub fn resolve_approval(&self, request_id: &str, response: ApprovalResponse) -> bool {
        let tx = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(request_id);
        match tx {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                log::warn!("unknown approval request: {request_id}");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop every pending request. Used during shutdown; awaiting
    /// callers see a denial.
    pub fn cancel_all(&self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Map a user response to the resulting decision.
fn decision_for(response: ApprovalResponse) -> SecurityDecision {
    match response {
        ApprovalResponse::AllowOnce => SecurityDecision {
            allowed: true,
            reason: "user:approved_once".into(),
            requires_approval: false,
            user_response: Some(response),
            remembered: false,
        },
        ApprovalResponse::AllowAlways => SecurityDecision {
            allowed: true,
            reason: "user:approved_always".into(),
            requires_approval: false,
            user_response: Some(response),
            remembered: true,
        },
        ApprovalResponse::Deny => SecurityDecision {
            allowed: false,
            reason: "user:denied".into(),
            requires_approval: false,
            user_response: Some(response),
            remembered: false,
        },
        ApprovalResponse::DenyAlways => SecurityDecision {
            allowed: false,
            reason: "user:denied_always".into(),
            requires_approval: false,
            user_response: Some(response),
            remembered: true,
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Capability;
    use std::collections::BTreeSet;

    fn spec() -> ToolSpec {
        let mut caps = BTreeSet::new();
        caps.insert(Capability::FileWrite);
        ToolSpec {
            name: "write_file".into(),
            description: "Write a file".into(),
            parameters: json!({"type": "object"}),
            required_capabilities: caps,
        }
    }

    #[tokio::test]
    async fn resolve_completes_the_request() {
        let bus = Arc::new(EventBus::new());
        let flow = Arc::new(ApprovalFlow::new(Arc::clone(&bus)));

        let flow_h = Arc::clone(&flow);
        bus.on(event_type::SECURITY_APPROVAL, move |e| {
            let flow = Arc::clone(&flow_h);
            async move {
                let id = e.data_str("request_id").unwrap_or_default().to_string();
                tokio::spawn(async move {
                    assert!(flow.resolve_approval(&id, ApprovalResponse::AllowOnce));
                });
                Ok(())
            }
        });

        let decision = flow.request_approval(&spec(), &ArgMap::new()).await;
        assert!(decision.allowed);
        assert_eq!(decision.user_response, Some(ApprovalResponse::AllowOnce));
        assert!(!decision.remembered);
        assert_eq!(flow.pending_count(), 0);
    }

    #[tokio::test]
    async fn allow_always_sets_remembered() {
        let bus = Arc::new(EventBus::new());
        let flow = Arc::new(ApprovalFlow::new(Arc::clone(&bus)));

        let flow_h = Arc::clone(&flow);
        bus.on(event_type::SECURITY_APPROVAL, move |e| {
            let flow = Arc::clone(&flow_h);
            async move {
                let id = e.data_str("request_id").unwrap_or_default().to_string();
                tokio::spawn(async move {
                    flow.resolve_approval(&id, ApprovalResponse::AllowAlways);
                });
                Ok(())
            }
        });

        let decision = flow.request_approval(&spec(), &ArgMap::new()).await;
        assert!(decision.allowed && decision.remembered);
    }

    #[tokio::test]
    async fn timeout_denies_and_late_resolve_is_noop() {
        let bus = Arc::new(EventBus::new());
        let flow = ApprovalFlow::with_timeout(bus, Duration::from_millis(20));

        let decision = flow.request_approval(&spec(), &ArgMap::new()).await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("timeout"));
        assert!(!flow.resolve_approval("approval_1", ApprovalResponse::AllowOnce));
    }

    #[tokio::test]
    async fn second_resolve_returns_false() {
        let bus = Arc::new(EventBus::new());
        let flow = Arc::new(ApprovalFlow::new(bus));

        let flow_bg = Arc::clone(&flow);
        let wait = tokio::spawn(async move { flow_bg.request_approval(&spec(), &ArgMap::new()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(flow.resolve_approval("approval_1", ApprovalResponse::Deny));
        assert!(!flow.resolve_approval("approval_1", ApprovalResponse::AllowOnce));
        let decision = wait.await.unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn unknown_request_returns_false() {
        let bus = Arc::new(EventBus::new());
        let flow = ApprovalFlow::new(bus);
        assert!(!flow.resolve_approval("approval_404", ApprovalResponse::AllowOnce));
    }
}
