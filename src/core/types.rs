//! Shared data model used across every layer.
//!
//! Messages, tool calls, tool specs, capabilities, security decisions
//! and LLM chunk types all live here so that the agent loop, skills,
//! security engine and providers agree on one vocabulary.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments to a tool call — a JSON object.
pub type ArgMap = Map<String, Value>;

// ─── Enums ────────────────────────────────────────────────────────────────────

/// Why the LLM stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Complete,
    ToolUse,
    MaxTokens,
    Cancelled,
}

/// Current state of an agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Composing,
    Thinking,
    Acting,
    WaitingApproval,
    Paused,
    Complete,
    Error,
}

/// What a tool needs permission to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "file:read")]
    FileRead,
    #[serde(rename = "file:write")]
    FileWrite,
    #[serde(rename = "file:delete")]
    FileDelete,
    #[serde(rename = "shell:exec")]
    ShellExec,
    #[serde(rename = "network:http")]
    NetworkHttp,
    #[serde(rename = "network:socket")]
    NetworkSocket,
    #[serde(rename = "browser")]
    Browser,
    #[serde(rename = "system:env")]
    SystemEnv,
    #[serde(rename = "system:process")]
    SystemProcess,
}

impl Capability {
    /// The wire/config string for this capability, e.g. `"file:read"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file:read",
            Self::FileWrite => "file:write",
            Self::FileDelete => "file:delete",
            Self::ShellExec => "shell:exec",
            Self::NetworkHttp => "network:http",
            Self::NetworkSocket => "network:socket",
            Self::Browser => "browser",
            Self::SystemEnv => "system:env",
            Self::SystemProcess => "system:process",
        }
    }

    /// Parse a config string back into a capability.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file:read" => Some(Self::FileRead),
            "file:write" => Some(Self::FileWrite),
            "file:delete" => Some(Self::FileDelete),
            "shell:exec" => Some(Self::ShellExec),
            "network:http" => Some(Self::NetworkHttp),
            "network:socket" => Some(Self::NetworkSocket),
            "browser" => Some(Self::Browser),
            "system:env" => Some(Self::SystemEnv),
            "system:process" => Some(Self::SystemProcess),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// A tool/function call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: ArgMap,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ArgMap) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result from executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            success: true,
            output: output.into(),
            error: None,
            artifacts: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            artifacts: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// A single message in a conversation.
///
/// The universal format used across all layers; provider adapters
/// convert to and from their wire formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// `"system"`, `"user"`, `"assistant"`, or `"tool"`.
    pub role: String,
    pub content: Option<String>,
    /// For tool messages: the tool name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// For assistant messages that request tool use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool result messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default = "chrono::Utc::now")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", Some(content.into()))
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        let mut m = Self::with_role("assistant", content);
        m.tool_calls = tool_calls;
        m
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, name: impl Into<String>) -> Self {
        let mut m = Self::with_role("tool", Some(content.into()));
        m.tool_call_id = Some(tool_call_id.into());
        m.name = Some(name.into());
        m
    }

    fn with_role(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            name: None,
            tool_calls: None,
            tool_call_id: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

// ─── LLM types ────────────────────────────────────────────────────────────────

/// Static metadata about an LLM model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    /// Maximum input context in tokens.
    pub context_window: usize,
    pub max_output_tokens: usize,
    /// USD per token; 0 for free/local models.
    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
    pub supports_tools: bool,
}

/// A single chunk from a streaming LLM response.
///
/// The last chunk of a stream carries `stop_reason` and the final
/// token counts.
#[derive(Debug, Clone, Default)]
pub struct LlmChunk {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl LlmChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn done(stop_reason: StopReason, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            stop_reason: Some(stop_reason),
            input_tokens,
            output_tokens,
            ..Self::default()
        }
    }
}

// ─── Skill types ──────────────────────────────────────────────────────────────

/// Tool specification — everything the LLM needs to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped parameter description, shipped as data.
    pub parameters: Value,
    #[serde(default)]
    pub required_capabilities: BTreeSet<Capability>,
}

/// Metadata about a skill — its identity, tools, and requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

// ─── Security types ───────────────────────────────────────────────────────────

/// The user's answer to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalResponse {
    AllowOnce,
    AllowAlways,
    Deny,
    DenyAlways,
}

impl ApprovalResponse {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow_once" => Some(Self::AllowOnce),
            "allow_always" => Some(Self::AllowAlways),
            "deny" => Some(Self::Deny),
            "deny_always" => Some(Self::DenyAlways),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowOnce => "allow_once",
            Self::AllowAlways => "allow_always",
            Self::Deny => "deny",
            Self::DenyAlways => "deny_always",
        }
    }

    /// `allow_always` and `deny_always` are remembered for the session.
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::AllowAlways | Self::DenyAlways)
    }
}

/// Result of a security check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDecision {
    pub allowed: bool,
    /// e.g. `"policy:auto_allow"`, `"user:approved_once"`, `"approval_timeout"`.
    pub reason: String,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_response: Option<ApprovalResponse>,
    #[serde(default)]
    pub remembered: bool,
}

impl SecurityDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_approval: false,
            user_response: None,
            remembered: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_approval: false,
            user_response: None,
            remembered: false,
        }
    }

    pub fn needs_approval(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_approval: true,
            user_response: None,
            remembered: false,
        }
    }
}

// ─── Agent state ──────────────────────────────────────────────────────────────

/// Observable state of a running agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub status: AgentStatus,
    pub iteration: u32,
    pub tokens_used: u64,
    pub cost_so_far: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Idle,
            iteration: 0,
            tokens_used: 0,
            cost_so_far: 0.0,
            started_at: chrono::Utc::now(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_round_trips_through_strings() {
        for cap in [
            Capability::FileRead,
            Capability::FileWrite,
            Capability::FileDelete,
            Capability::ShellExec,
            Capability::NetworkHttp,
            Capability::NetworkSocket,
            Capability::Browser,
            Capability::SystemEnv,
            Capability::SystemProcess,
        ] {
            assert_eq!(Capability::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::parse("file:execute"), None);
    }

    #[test]
    fn tool_call_ids_are_short_and_unique() {
        let a = ToolCall::new("greet", ArgMap::new());
        let b = ToolCall::new("greet", ArgMap::new());
        assert_eq!(a.id.len(), 12);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn tool_message_carries_call_id() {
        let m = Message::tool_result("tc_1", "Hello, World!", "greet");
        assert_eq!(m.role, "tool");
        assert_eq!(m.tool_call_id.as_deref(), Some("tc_1"));
        assert_eq!(m.name.as_deref(), Some("greet"));
    }

    #[test]
    fn assistant_message_may_have_empty_content_with_tool_calls() {
        let call = ToolCall::new("greet", ArgMap::new());
        let m = Message::assistant(None, Some(vec![call]));
        assert!(m.content.is_none());
        assert_eq!(m.tool_calls.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn approval_response_parsing() {
        assert_eq!(ApprovalResponse::parse(" Allow_Always "), Some(ApprovalResponse::AllowAlways));
        assert_eq!(ApprovalResponse::parse("deny"), Some(ApprovalResponse::Deny));
        assert_eq!(ApprovalResponse::parse("maybe"), None);
        assert!(ApprovalResponse::AllowAlways.is_sticky());
        assert!(!ApprovalResponse::AllowOnce.is_sticky());
    }

    #[test]
    fn capability_serde_uses_wire_names() {
        let json = serde_json::to_string(&Capability::ShellExec).unwrap();
        assert_eq!(json, "\"shell:exec\"");
        let back: Capability = serde_json::from_str("\"file:write\"").unwrap();
        assert_eq!(back, Capability::FileWrite);
    }
}
