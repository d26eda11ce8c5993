//! Scheduler engine — the background task that fires due jobs.
//!
//! Polls the store every `poll_interval`, spawns one task per due job
//! (guarded so a job is never in flight twice), and routes each result
//! through the notification router. Missed fires while the process was
//! down are not replayed — `next_run` is recomputed from now on
//! startup.
//!
//! Execution modes per job:
//! - `use_tools = false`: a single plain LLM call, no tools, no
//!   approval prompts.
//! - `use_tools = true`: a full sub-agent on a virtual platform with a
//!   permissive security engine and a 300 s wall-clock bound.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::StreamExt;
use serde_json::json;

use crate::agent::{run_agent_on_virtual_platform, AgentLoop, AgentRegistry};
use crate::core::types::Message;
use crate::core::{event_type, Event, Kernel};
use crate::llm::{GenerateRequest, LlmProvider};
use crate::notifications::{Notification, NotificationRouter};

use super::job::{Job, Trigger};
use super::store::SchedulerStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const JOB_AGENT_TIMEOUT: Duration = Duration::from_secs(300);

const JOB_SYSTEM_PROMPT: &str = "You are a helpful proactive assistant completing a scheduled task. \
     Be concise and clear. Do not ask follow-up questions.";

/// Builds a fresh sub-agent for a `use_tools` job; the argument is the
/// agent id (`"scheduler:<name>"`).
pub type AgentFactory = Box<dyn Fn(&str) -> AgentLoop + Send + Sync>;

pub struct SchedulerEngine {
    store: Arc<SchedulerStore>,
    llm: Arc<dyn LlmProvider>,
    agent_factory: AgentFactory,
    router: Arc<NotificationRouter>,
    kernel: Arc<Kernel>,
    agent_registry: Option<Arc<AgentRegistry>>,
    poll_interval: Duration,
    in_flight: Mutex<HashSet<String>>,
    running: AtomicBool,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<SchedulerStore>,
        llm: Arc<dyn LlmProvider>,
        agent_factory: AgentFactory,
        router: Arc<NotificationRouter>,
        kernel: Arc<Kernel>,
        agent_registry: Option<Arc<AgentRegistry>>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            llm,
            agent_factory,
            router,
            kernel,
            agent_registry,
            poll_interval,
            in_flight: Mutex::new(HashSet::new()),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Start the background polling loop. Idempotent.
    pub async fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.compute_initial_next_runs().await;

        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while engine.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(e) = Arc::clone(&engine).tick().await {
                    log::warn!("scheduler tick error (non-fatal): {e}");
                }
            }
        });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        log::info!("scheduler engine started");
    }

    /// Stop the polling loop.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
        log::info!("scheduler engine stopped");
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// One due-job scan; public so tests can drive the engine without
    /// waiting for the ticker.
    pub async fn tick(self: Arc<Self>) -> Result<(), crate::core::ArcError> {
        let now = chrono::Utc::now().timestamp();
        let due = self.store.get_due_jobs(now).await?;
        for job in due {
            {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                if !in_flight.insert(job.id.clone()) {
                    log::debug!("job '{}' still executing, skipping tick", job.name);
                    continue;
                }
            }
            let engine = Arc::clone(&self);
            let name = job.name.clone();
            let fire = async move { engine.fire_job(job).await };
            match &self.agent_registry {
                Some(registry) => registry.register_worker(&format!("scheduler:{name}"), fire),
                None => {
                    tokio::spawn(fire);
                }
            }
        }
        Ok(())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // ── Firing ───────────────────────────────────────────────────────────────

    async fn fire_job(self: Arc<Self>, job: Job) {
        log::info!("firing scheduled job '{}' (id={}, use_tools={})", job.name, job.id, job.use_tools);
        let now = chrono::Utc::now().timestamp();
        let source = format!("scheduler:{}", job.name);
        let mut error: Option<String> = None;

        self.kernel
            .emit(Event::new(event_type::AGENT_SPAWNED, source.clone()).with_data(json!({
                "task_id": job.id,
                "task_name": job.name,
                "use_tools": job.use_tools,
            })))
            .await;

        let content = if job.use_tools {
            let agent = (self.agent_factory)(&source);
            let (content, run_error) =
                run_agent_on_virtual_platform(agent, &job.prompt, &source, JOB_AGENT_TIMEOUT).await;
            match run_error {
                Some(e) => {
                    log::warn!("job '{}' failed: {e}", job.name);
                    error = Some(e.clone());
                    format!("(job failed: {e})")
                }
                None => content,
            }
        } else {
            match self.run_prompt(&job.prompt).await {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("job '{}' failed: {e}", job.name);
                    error = Some(e.to_string());
                    format!("(job failed: {e})")
                }
            }
        };

        // Advance the schedule BEFORE releasing the in-flight guard so
        // the next tick cannot observe the stale next_run and
        // double-fire.
        let next_run = job.trigger.next_fire_time(now, now);
        if next_run == 0 {
            if matches!(job.trigger, Trigger::Oneshot { .. }) {
                let _ = self.store.delete(&job.id).await;
                log::debug!("oneshot job '{}' deleted after firing", job.name);
            } else {
                let _ = self.store.update_after_run(&job.id, 0, now).await;
            }
        } else if let Err(e) = self.store.update_after_run(&job.id, next_run, now).await {
            log::warn!("job '{}' reschedule failed: {e}", job.name);
        }

        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&job.id);

        self.kernel
            .emit(Event::new(event_type::AGENT_TASK_COMPLETE, source).with_data(json!({
                "task_id": job.id,
                "task_name": job.name,
                "success": error.is_none(),
            })))
            .await;

        let notification = Notification {
            job_id: job.id.clone(),
            job_name: job.name.clone(),
            content,
            fired_at: now,
        };
        self.router.route(&notification).await;
    }

    /// Plain text generation for `use_tools = false` jobs.
    async fn run_prompt(&self, prompt: &str) -> Result<String, crate::core::ArcError> {
        let messages = vec![Message::system(JOB_SYSTEM_PROMPT), Message::user(prompt)];
        let request = GenerateRequest::new(messages).with_temperature(0.5);
        let mut stream = self.llm.generate(request).await?;

        let mut parts = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            parts.push_str(&chunk.text);
        }
        Ok(parts.trim().to_string())
    }

    // ── Startup pass ─────────────────────────────────────────────────────────

    /// Populate `next_run` for active jobs with `next_run = 0` and push
    /// forward any job whose `next_run` is in the past. Missed fires
    /// are skipped, not replayed.
    async fn compute_initial_next_runs(&self) {
        let now = chrono::Utc::now().timestamp();
        let jobs = match self.store.get_all(true).await {
            Ok(jobs) => jobs,
            Err(e) => {
                log::warn!("scheduler startup scan failed: {e}");
                return;
            }
        };
        for job in jobs {
            if job.next_run == 0 || job.next_run < now {
                let next_run = job.trigger.next_fire_time(now, now);
                if let Err(e) = self.store.update_after_run(&job.id, next_run, job.last_run).await {
                    log::warn!("job '{}' startup reschedule failed: {e}", job.name);
                } else {
                    log::debug!("job '{}': next_run initialised to {next_run}", job.name);
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
