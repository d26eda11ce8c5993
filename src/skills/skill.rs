//! The skill contract.
//!
//! A skill is a bundle of related tools with a lifecycle and a
//! manifest. Minimal implementations need only `manifest()` and
//! `execute_tool()`; activation is lazy — heavy setup belongs in
//! `activate`, which the manager calls exactly once before the first
//! tool execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::types::{ArgMap, SkillManifest, ToolResult};
use crate::core::{ArcError, Kernel};

#[async_trait]
pub trait Skill: Send + Sync {
    /// Skill metadata and tool specifications.
    fn manifest(&self) -> SkillManifest;

    /// Called once at registration. Store references for later.
    async fn initialize(&self, _kernel: Arc<Kernel>, _config: Value) -> Result<(), ArcError> {
        Ok(())
    }

    /// Called before first use. Do heavy setup here.
    async fn activate(&self) -> Result<(), ArcError> {
        Ok(())
    }

    /// Execute a tool by name. Errors are converted to failure
    /// [`ToolResult`]s by the manager, never propagated to the loop.
    async fn execute_tool(&self, tool_name: &str, arguments: &ArgMap) -> Result<ToolResult, ArcError>;

    /// Called when the agent pauses. Release temporary resources.
    async fn deactivate(&self) {}

    /// Called when the runtime stops. Release everything.
    async fn shutdown(&self) {}
}

/// Helper for reading a required string argument.
pub fn required_str<'a>(arguments: &'a ArgMap, key: &str) -> Result<&'a str, ArcError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ArcError::Skill(format!("missing required argument '{key}'")))
}

/// Helper for reading an optional integer argument.
pub fn optional_i64(arguments: &ArgMap, key: &str) -> Option<i64> {
    arguments.get(key).and_then(Value::as_i64)
}
