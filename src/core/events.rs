//! Event types and constants.
//!
//! Every action in the system produces an [`Event`]. Types are
//! hierarchical strings (`"agent:thinking"`); subscription patterns may
//! be an exact type, a `"prefix:*"` glob, or `"*"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type constants, grouped by category.
pub mod event_type {
    // System lifecycle
    pub const SYSTEM_START: &str = "system:start";
    pub const SYSTEM_STOP: &str = "system:stop";
    pub const SYSTEM_ERROR: &str = "system:error";

    // Agent states
    pub const AGENT_START: &str = "agent:start";
    pub const AGENT_THINKING: &str = "agent:thinking";
    pub const AGENT_ERROR: &str = "agent:error";
    pub const AGENT_COMPLETE: &str = "agent:complete";
    pub const AGENT_SPAWNED: &str = "agent:spawned";
    pub const AGENT_TASK_COMPLETE: &str = "agent:task_complete";
    pub const AGENT_ESCALATION: &str = "agent:escalation";

    // LLM interactions
    pub const LLM_REQUEST: &str = "llm:request";
    pub const LLM_CHUNK: &str = "llm:chunk";
    pub const LLM_RESPONSE: &str = "llm:response";
    pub const LLM_ERROR: &str = "llm:error";

    // Skill / tool interactions
    pub const SKILL_LOADED: &str = "skill:loaded";
    pub const SKILL_ACTIVATED: &str = "skill:activated";
    pub const SKILL_TOOL_CALL: &str = "skill:tool_call";
    pub const SKILL_TOOL_RESULT: &str = "skill:tool_result";
    pub const SKILL_ERROR: &str = "skill:error";

    // Security
    pub const SECURITY_APPROVAL: &str = "security:approval";
    pub const SECURITY_DENIED: &str = "security:denied";

    // Wildcard
    pub const ALL: &str = "*";
}

/// A single event.
///
/// Events are typed, timestamped, traceable (`source` + `parent_id`
/// form a causal DAG) and extensible via the `data` and `metadata`
/// maps. Middleware may annotate `metadata`; `data` belongs to the
/// emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    /// Unix timestamp, fractional seconds.
    pub timestamp: f64,
    /// Which component emitted this, e.g. `"main"`, `"worker:research"`.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            id: uuid::Uuid::new_v4().simple().to_string()[..16].to_string(),
            timestamp: now_ts(),
            source: source.into(),
            parent_id: None,
            data: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Builder-style data attachment from any JSON object literal.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    /// Create a child event linked to this one.
    pub fn child(&self, event_type: impl Into<String>, data: Value) -> Self {
        let mut e = Self::new(event_type, self.source.clone());
        e.parent_id = Some(self.id.clone());
        e.with_data(data)
    }

    /// Shortcut for a string field in `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Does `pattern` match `event_type`?
///
/// Patterns are an exact type string, a `"prefix:*"` glob, or `"*"`.
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == event_type || pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(":*") {
        return event_type
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':'));
    }
    false
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_have_stable_unique_ids() {
        let a = Event::new(event_type::AGENT_START, "main");
        let b = Event::new(event_type::AGENT_START, "main");
        assert_eq!(a.id.len(), 16);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn child_event_links_parent() {
        let parent = Event::new("agent:thinking", "main");
        let child = parent.child("skill:tool_call", json!({"tool": "greet"}));
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.source, "main");
        assert_eq!(child.data_str("tool"), Some("greet"));
    }

    #[test]
    fn exact_pattern_matches() {
        assert!(pattern_matches("agent:thinking", "agent:thinking"));
        assert!(!pattern_matches("agent:thinking", "agent:complete"));
    }

    #[test]
    fn wildcard_patterns() {
        assert!(pattern_matches("*", "anything:at_all"));
        assert!(pattern_matches("agent:*", "agent:thinking"));
        assert!(pattern_matches("agent:*", "agent:task_complete"));
        assert!(!pattern_matches("agent:*", "agents:thinking"));
        assert!(!pattern_matches("agent:*", "skill:tool_call"));
        // A bare prefix without the colon is not a glob.
        assert!(!pattern_matches("agent*", "agent:thinking"));
    }

    #[test]
    fn event_serde_uses_type_key() {
        let e = Event::new("system:start", "kernel");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v.get("type").and_then(|v| v.as_str()), Some("system:start"));
    }
}
