//! Worker skill — fire-and-forget delegation to background agents.
//!
//! `delegate_task` spawns a short-lived agent loop on a silent virtual
//! platform and returns immediately; the main agent stays free. The
//! worker's result is pushed through the notification router — the same
//! pipeline as scheduled jobs — and lands on the pending queue for the
//! next conversation turn. One retry on failure; a second failure
//! becomes an error notification.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{run_agent_on_virtual_platform, AgentLoop, AgentLoopConfig, AgentRegistry};
use crate::core::types::{ArgMap, Capability, SkillManifest, ToolResult, ToolSpec};
use crate::core::{event_type, ArcError, Event, Kernel};
use crate::llm::LlmProvider;
use crate::security::SecurityEngine;

use super::manager::SkillManager;
use super::skill::{optional_i64, required_str, Skill};

/// Skills workers must never have — prevents recursive delegation and
/// scheduling loops.
const ALWAYS_EXCLUDED: [&str; 2] = ["worker", "scheduler"];

// Hard ceilings for runaway tasks.
const MAX_TIMEOUT_SECS: i64 = 1800;
const MIN_TIMEOUT_SECS: i64 = 10;
const DEFAULT_TIMEOUT_SECS: i64 = 300;
const MAX_ITERATIONS: i64 = 50;
const DEFAULT_ITERATIONS: i64 = 20;

const WORKER_SYSTEM_PROMPT: &str = "You are a focused background worker completing a specific sub-task. \
     Do not ask clarifying questions — make your best effort with the \
     information provided. Return a clear, structured result.\n\n\
     Tool use rules:\n\
     - Use the minimum number of tool calls needed to complete the task.\n\
     - Never call the same tool twice with the same or similar arguments.\n\
     - If you have sufficient information to answer, do not make more tool calls.";

/// Runtime wiring injected after construction (the skill and the
/// manager that owns it reference each other). Workers deliberately
/// run without a long-term memory manager.
pub struct WorkerDeps {
    pub kernel: Arc<Kernel>,
    pub llm: Arc<dyn LlmProvider>,
    pub skill_manager: Arc<SkillManager>,
    pub notification_router: Arc<crate::notifications::NotificationRouter>,
    pub agent_registry: Arc<AgentRegistry>,
}

pub struct WorkerSkill {
    deps: OnceLock<WorkerDeps>,
}

impl WorkerSkill {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deps: OnceLock::new(),
        })
    }

    /// Inject runtime dependencies. Must be called before first use.
    pub fn set_dependencies(&self, deps: WorkerDeps) {
        if self.deps.set(deps).is_err() {
            log::warn!("worker skill dependencies already set");
        }
    }

    fn deps(&self) -> Result<&WorkerDeps, ArcError> {
        self.deps
            .get()
            .ok_or_else(|| ArcError::Skill("worker skill not wired — call set_dependencies() first".into()))
    }

    // ── delegate_task ────────────────────────────────────────────────────────

    async fn delegate_task(&self, arguments: &ArgMap) -> Result<ToolResult, ArcError> {
        let deps = self.deps()?;
        let task_name = arguments
            .get("task_name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed_task")
            .to_string();
        let prompt = required_str(arguments, "prompt")?.to_string();
        let allowed_skills: Option<Vec<String>> = arguments
            .get("allowed_skills")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect());

        let timeout_seconds = optional_i64(arguments, "timeout_seconds")
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS) as u64;
        let max_iterations = optional_i64(arguments, "max_iterations")
            .unwrap_or(DEFAULT_ITERATIONS)
            .clamp(1, MAX_ITERATIONS) as u32;

        let task_id = format!(
            "{task_name}_{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let excluded = self.compute_excluded(allowed_skills.as_deref(), &deps.skill_manager);

        log::info!("spawning background worker '{task_id}' (timeout={timeout_seconds}s, max_iter={max_iterations})");

        deps.kernel
            .emit(
                Event::new(event_type::AGENT_SPAWNED, format!("worker:{task_name}")).with_data(json!({
                    "task_id": task_id,
                    "task_name": task_name,
                })),
            )
            .await;

        // Fire and forget — the main agent continues immediately. The
        // registry owns the handle so shutdown stays deterministic.
        let run = Self::run_and_notify(
            RunParams {
                task_id: task_id.clone(),
                task_name: task_name.clone(),
                prompt,
                excluded,
                timeout: Duration::from_secs(timeout_seconds),
                max_iterations,
            },
            WorkerDeps {
                kernel: Arc::clone(&deps.kernel),
                llm: Arc::clone(&deps.llm),
                skill_manager: Arc::clone(&deps.skill_manager),
                notification_router: Arc::clone(&deps.notification_router),
                agent_registry: Arc::clone(&deps.agent_registry),
            },
        );
        deps.agent_registry.register_worker(&task_id, run);

        let time_str = if timeout_seconds >= 60 {
            let m = timeout_seconds / 60;
            let s = timeout_seconds % 60;
            if s == 0 { format!("{m}m") } else { format!("{m}m {s}s") }
        } else {
            format!("{timeout_seconds}s")
        };

        Ok(ToolResult::ok(format!(
            "Worker '{task_name}' started (id: {task_id}). \
             Timeout: {time_str}, up to {max_iterations} iterations. \
             I'll notify you when it completes."
        )))
    }

    fn list_workers(&self) -> Result<ToolResult, ArcError> {
        let deps = self.deps()?;
        let active = deps.agent_registry.list_worker_ids();
        if active.is_empty() {
            return Ok(ToolResult::ok("No background workers are currently running."));
        }
        let lines: Vec<String> = active.iter().map(|id| format!("  • {id}")).collect();
        Ok(ToolResult::ok(format!(
            "{} worker(s) running:\n{}",
            active.len(),
            lines.join("\n")
        )))
    }

    /// If `allowed_skills` is given, exclude everything not in it (plus
    /// the always-excluded set); otherwise only the always-excluded
    /// skills.
    fn compute_excluded(&self, allowed: Option<&[String]>, manager: &SkillManager) -> HashSet<String> {
        let mut excluded: HashSet<String> = ALWAYS_EXCLUDED.iter().map(|s| s.to_string()).collect();
        let Some(allowed) = allowed else {
            return excluded;
        };
        let allowed: HashSet<&str> = allowed
            .iter()
            .map(String::as_str)
            .filter(|name| !ALWAYS_EXCLUDED.contains(name))
            .collect();
        for name in manager.skill_names() {
            if !allowed.contains(name.as_str()) {
                excluded.insert(name);
            }
        }
        excluded
    }

    // ── Background execution ─────────────────────────────────────────────────

    async fn run_and_notify(params: RunParams, deps: WorkerDeps) {
        // Attempt 1, then exactly one retry on failure.
        let (mut content, mut error) = Self::run_worker(&params, &deps, &params.task_id).await;
        if error.is_some() {
            log::warn!(
                "worker '{}' attempt 1 failed: {} — retrying",
                params.task_id,
                error.as_deref().unwrap_or("")
            );
            let retry_id = format!("{}_retry", params.task_id);
            (content, error) = Self::run_worker(&params, &deps, &retry_id).await;
        }

        let notification_content = match &error {
            Some(e) => {
                log::error!("worker '{}' failed after retry: {e}", params.task_id);
                format!("❌ {} failed: {e}", params.task_name)
            }
            None => {
                let body = if content.is_empty() { "(no output)" } else { content.as_str() };
                format!("✅ {} completed:\n\n{body}", params.task_name)
            }
        };

        deps.kernel
            .emit(
                Event::new(event_type::AGENT_TASK_COMPLETE, format!("worker:{}", params.task_name)).with_data(
                    json!({
                        "task_id": params.task_id,
                        "task_name": params.task_name,
                        "success": error.is_none(),
                    }),
                ),
            )
            .await;

        let notification = crate::notifications::Notification::new(
            &params.task_id,
            &params.task_name,
            &notification_content,
        );
        deps.notification_router.route(&notification).await;
        log::info!("worker '{}' result delivered via notification router", params.task_id);
    }

    /// One worker attempt on a fresh virtual platform.
    async fn run_worker(params: &RunParams, deps: &WorkerDeps, run_id: &str) -> (String, Option<String>) {
        // "research_a1b2c3d4" → "research" for the agent id label.
        let label = params
            .task_id
            .rsplit_once('_')
            .filter(|(_, suffix)| suffix.len() == 8)
            .map(|(head, _)| head)
            .unwrap_or(&params.task_id);

        let agent = AgentLoop::new(
            Arc::clone(&deps.kernel),
            Arc::clone(&deps.llm),
            Arc::clone(&deps.skill_manager),
            Arc::new(SecurityEngine::permissive()),
            WORKER_SYSTEM_PROMPT,
            AgentLoopConfig {
                max_iterations: params.max_iterations,
                temperature: 0.4,
                excluded_skills: params.excluded.clone(),
                agent_id: format!("worker:{label}"),
                ..Default::default()
            },
            None,
        );
        run_agent_on_virtual_platform(agent, &params.prompt, run_id, params.timeout).await
    }
}

struct RunParams {
    task_id: String,
    task_name: String,
    prompt: String,
    excluded: HashSet<String>,
    timeout: Duration,
    max_iterations: u32,
}

#[async_trait]
impl Skill for WorkerSkill {
    fn manifest(&self) -> SkillManifest {
        SkillManifest {
            name: "worker".into(),
            version: "1.0.0".into(),
            description: "Delegate a sub-task to a background worker agent and continue immediately".into(),
            capabilities: [Capability::FileRead].into_iter().collect(),
            tools: vec![
                ToolSpec {
                    name: "delegate_task".into(),
                    description: "Spawn a background worker for a focused sub-task. \
                         Returns IMMEDIATELY — you do NOT wait for the result; it will be \
                         delivered as a notification when ready. After calling this tool, \
                         confirm to the user what you delegated and STOP calling tools. \
                         Use this for tasks that need live data or take a long time."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "task_name": {
                                "type": "string",
                                "description": "Short descriptive name, e.g. 'research_ai_news'. Shown in progress and result notifications."
                            },
                            "prompt": {
                                "type": "string",
                                "description": "Full instructions for the worker. Include all context — the worker has no conversation history."
                            },
                            "allowed_skills": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "Optional: skill names the worker may use. Omit to give it everything except 'worker' and 'scheduler'."
                            },
                            "timeout_seconds": {
                                "type": "integer",
                                "description": "Wall-clock timeout in seconds. Default 300, maximum 1800."
                            },
                            "max_iterations": {
                                "type": "integer",
                                "description": "Maximum think-act cycles. Default 20, maximum 50."
                            }
                        },
                        "required": ["task_name", "prompt"]
                    }),
                    required_capabilities: [Capability::FileRead].into_iter().collect(),
                },
                ToolSpec {
                    name: "list_workers".into(),
                    description: "List background workers that are still running. Only call this when \
                         the user explicitly asks what is in progress — results arrive \
                         automatically, no polling needed."
                        .into(),
                    parameters: json!({"type": "object", "properties": {}, "required": []}),
                    required_capabilities: Default::default(),
                },
            ],
        }
    }

    async fn execute_tool(&self, tool_name: &str, arguments: &ArgMap) -> Result<ToolResult, ArcError> {
        match tool_name {
            "delegate_task" => self.delegate_task(arguments).await,
            "list_workers" => self.list_workers(),
            other => Ok(ToolResult::err(format!("Unknown tool: {other}"))),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
