//! Scheduler skill — lets the LLM create, list, and cancel jobs.
//!
//! Answers requests like "remind me every day at 9am to check my
//! downloads" or "cancel the morning_check job". Cron expressions are
//! validated here, at creation time, so a bad expression never reaches
//! the store.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::{json, Value};

use crate::core::types::{ArgMap, Capability, SkillManifest, ToolResult, ToolSpec};
use crate::core::ArcError;
use crate::scheduler::{Job, SchedulerStore, Trigger};

use super::skill::{optional_i64, required_str, Skill};

pub struct SchedulerSkill {
    store: OnceLock<Arc<SchedulerStore>>,
}

impl SchedulerSkill {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: OnceLock::new(),
        })
    }

    /// Inject the store. Called from wiring after the store is open.
    pub fn set_store(&self, store: Arc<SchedulerStore>) {
        if self.store.set(store).is_err() {
            log::warn!("scheduler skill store already set");
        }
    }

    fn store(&self) -> Result<&Arc<SchedulerStore>, ArcError> {
        self.store
            .get()
            .ok_or_else(|| ArcError::Skill("scheduler skill not wired — call set_store() first".into()))
    }

    // ── Tool implementations ─────────────────────────────────────────────────

    async fn schedule_job(&self, arguments: &ArgMap) -> Result<ToolResult, ArcError> {
        let store = self.store()?;
        let name = required_str(arguments, "name")?;
        let prompt = required_str(arguments, "prompt")?;
        let trigger_type = required_str(arguments, "trigger_type")?;

        let trigger = match trigger_type {
            "cron" => Trigger::Cron {
                expression: required_str(arguments, "cron_expression")?.to_string(),
            },
            "interval" => Trigger::Interval {
                seconds: optional_i64(arguments, "interval_seconds")
                    .ok_or_else(|| ArcError::Skill("interval trigger needs interval_seconds".into()))?
                    .max(0) as u64,
            },
            "oneshot" => Trigger::Oneshot {
                at: optional_i64(arguments, "fire_at")
                    .ok_or_else(|| ArcError::Skill("oneshot trigger needs fire_at (unix timestamp)".into()))?,
            },
            other => {
                return Ok(ToolResult::err(format!(
                    "Unknown trigger_type '{other}'. Use cron, interval, or oneshot."
                )))
            }
        };

        if let Err(e) = trigger.validate() {
            return Ok(ToolResult::err(e.to_string()));
        }

        if store.get_by_name(name).await?.is_some() {
            return Ok(ToolResult::err(format!(
                "A job named '{name}' already exists. Cancel it first or pick another name."
            )));
        }

        let use_tools = arguments
            .get("use_tools")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let now = chrono::Utc::now().timestamp();
        let mut job = Job::new(name, prompt, trigger).with_tools(use_tools);
        job.next_run = job.trigger.next_fire_time(0, now);
        store.save(&job).await?;

        let when = describe_next_run(job.next_run);
        Ok(ToolResult::ok(format!(
            "Scheduled '{name}' ({}). First run: {when}.",
            job.trigger.describe()
        )))
    }

    async fn list_jobs(&self) -> Result<ToolResult, ArcError> {
        let store = self.store()?;
        let jobs = store.get_all(false).await?;
        if jobs.is_empty() {
            return Ok(ToolResult::ok("No scheduled jobs."));
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|j| {
                format!(
                    "  • {} [{}] {} — next: {}{}",
                    j.name,
                    j.id,
                    j.trigger.describe(),
                    describe_next_run(j.next_run),
                    if j.active { "" } else { " (inactive)" }
                )
            })
            .collect();
        Ok(ToolResult::ok(format!("{} job(s):\n{}", jobs.len(), lines.join("\n"))))
    }

    async fn cancel_job(&self, arguments: &ArgMap) -> Result<ToolResult, ArcError> {
        let store = self.store()?;
        let name_or_id = required_str(arguments, "name_or_id")?;

        let job = match store.get_by_name(name_or_id).await? {
            Some(job) => Some(job),
            None => store
                .get_all(false)
                .await?
                .into_iter()
                .find(|j| j.id == name_or_id),
        };

        match job {
            Some(job) => {
                store.delete(&job.id).await?;
                Ok(ToolResult::ok(format!("Cancelled job '{}'.", job.name)))
            }
            None => Ok(ToolResult::err(format!("No job named '{name_or_id}' found."))),
        }
    }
}

fn describe_next_run(next_run: i64) -> String {
    if next_run <= 0 {
        return "not scheduled".to_string();
    }
    chrono::Local
        .timestamp_opt(next_run, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| next_run.to_string())
}

#[async_trait]
impl Skill for SchedulerSkill {
    fn manifest(&self) -> SkillManifest {
        SkillManifest {
            name: "scheduler".into(),
            version: "1.0.0".into(),
            description: "Schedule recurring or one-time tasks to run proactively".into(),
            capabilities: [Capability::FileRead].into_iter().collect(),
            tools: vec![
                ToolSpec {
                    name: "schedule_job".into(),
                    description: "Create a scheduled job that runs the prompt automatically and \
                         notifies the user with the result. trigger_type='cron' with a \
                         5-field cron_expression (e.g. '0 9 * * 1-5' = weekdays at 9am), \
                         'interval' with interval_seconds, or 'oneshot' with fire_at \
                         (unix timestamp). Set use_tools=true only when the task needs \
                         live data or file access; leave it false for reminders and \
                         anything answerable from model knowledge."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "name": {"type": "string", "description": "Short unique name, e.g. 'morning_summary'"},
                            "prompt": {"type": "string", "description": "What to do or say when the job fires"},
                            "trigger_type": {"type": "string", "enum": ["cron", "interval", "oneshot"]},
                            "cron_expression": {"type": "string", "description": "5-field cron expression (for trigger_type=cron)"},
                            "interval_seconds": {"type": "integer", "description": "Repeat interval in seconds (for trigger_type=interval)"},
                            "fire_at": {"type": "integer", "description": "Unix timestamp (for trigger_type=oneshot)"},
                            "use_tools": {"type": "boolean", "description": "Run with full tool access (default false)"}
                        },
                        "required": ["name", "prompt", "trigger_type"]
                    }),
                    required_capabilities: [Capability::FileRead].into_iter().collect(),
                },
                ToolSpec {
                    name: "list_jobs".into(),
                    description: "List all scheduled jobs with their triggers and next run times.".into(),
                    parameters: json!({"type": "object", "properties": {}, "required": []}),
                    required_capabilities: Default::default(),
                },
                ToolSpec {
                    name: "cancel_job".into(),
                    description: "Cancel a scheduled job by name or id.".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "name_or_id": {"type": "string", "description": "The job's name or id"}
                        },
                        "required": ["name_or_id"]
                    }),
                    required_capabilities: [Capability::FileRead].into_iter().collect(),
                },
            ],
        }
    }

    async fn execute_tool(&self, tool_name: &str, arguments: &ArgMap) -> Result<ToolResult, ArcError> {
        match tool_name {
            "schedule_job" => self.schedule_job(arguments).await,
            "list_jobs" => self.list_jobs().await,
            "cancel_job" => self.cancel_job(arguments).await,
            other => Ok(ToolResult::err(format!("Unknown tool: {other}"))),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
