//! Shared helper: run an agent once on a virtual platform.
//!
//! Both the worker skill and the scheduler need the same shape — wrap
//! an [`AgentLoop`] in a silent [`VirtualPlatform`], send one prompt,
//! collect the full response, and handle timeout and errors cleanly.

use std::{sync::Arc, time::Duration};

use crate::platforms::VirtualPlatform;

use super::loop_::AgentLoop;

/// Run `agent` on a fresh virtual platform with a wall-clock bound.
///
/// Returns `(content, None)` on success, `("", Some(error))` on
/// timeout or failure. Never panics or propagates.
pub async fn run_agent_on_virtual_platform(
    agent: AgentLoop,
    prompt: &str,
    name: &str,
    timeout: Duration,
) -> (String, Option<String>) {
    let platform = VirtualPlatform::new(name);
    let platform_task = tokio::spawn(Arc::clone(&platform).run(agent));

    match tokio::time::timeout(timeout, platform.send_message(prompt)).await {
        Ok(Ok(content)) => {
            platform.stop().await;
            let _ = tokio::time::timeout(Duration::from_secs(5), platform_task).await;
            // A handler failure is buffered as "[Error: …]" rather than
            // surfaced through send_message; report it as a failure so
            // callers can retry.
            if let Some(error) = content.trim().strip_prefix("[Error:") {
                let error = error.trim_end_matches(']').trim().to_string();
                return (String::new(), Some(error));
            }
            (content, None)
        }
        Ok(Err(e)) => {
            platform_task.abort();
            (String::new(), Some(e.to_string()))
        }
        Err(_) => {
            log::warn!("agent run '{name}' timed out after {}s", timeout.as_secs());
            platform_task.abort();
            (String::new(), Some(format!("Timed out after {}s", timeout.as_secs())))
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
