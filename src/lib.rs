//! Arc — a personal agent runtime.
//!
//! One interactive "main" conversational agent plus an unbounded set
//! of background agents (workers and scheduled jobs), tool calls gated
//! by a capability policy with interactive approval, and asynchronous
//! results delivered back into the conversation without corrupting the
//! streaming terminal output.

pub mod agent;
pub mod config;
pub mod core;
pub mod identity;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod middleware;
pub mod notifications;
pub mod platforms;
pub mod scheduler;
pub mod security;
pub mod skills;

/// Convenience re-exports for the most commonly used types.
///
/// ```rust
/// use arc_agent::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{AgentLoop, AgentLoopConfig, AgentRegistry, ChunkSink};
    pub use crate::config::ArcConfig;
    pub use crate::core::types::{
        AgentState, AgentStatus, ApprovalResponse, Capability, LlmChunk, Message, SecurityDecision,
        SkillManifest, StopReason, ToolCall, ToolResult, ToolSpec,
    };
    pub use crate::core::{event_type, ArcError, EscalationBus, Event, EventBus, Kernel};
    pub use crate::llm::{GenerateRequest, LlmProvider, MockProvider, OllamaProvider};
    pub use crate::memory::{InMemoryManager, MemoryManager, SessionMemory};
    pub use crate::notifications::{Notification, NotificationChannel, NotificationRouter};
    pub use crate::platforms::{CliPlatform, MessageHandler, VirtualPlatform};
    pub use crate::scheduler::{Job, SchedulerEngine, SchedulerStore, Trigger};
    pub use crate::security::{ApprovalFlow, SecurityEngine};
    pub use crate::skills::{Skill, SkillManager};
}
