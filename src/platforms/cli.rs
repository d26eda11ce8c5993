//! Interactive terminal platform.
//!
//! Single-threaded from the user's perspective: a prompt loop that
//! streams agent text, renders status and tool-call lines, prompts for
//! approvals and escalations, and injects finished background results
//! into the conversation.
//!
//! Two delivery paths share the pending queue on purpose: draining at
//! turn start guarantees the main agent sees results in context, and
//! the ~1 s watcher gives an idle user immediate visibility. The
//! `turn_in_progress` flag is the mutex between them.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::TimeZone;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::agent::{AgentLoop, ChunkSink};
use crate::core::types::ApprovalResponse;
use crate::core::{event_type, EscalationBus, Event, Kernel};
use crate::memory::MemoryManager;
use crate::middleware::CostTracker;
use crate::notifications::{CliChannel, Notification, PendingQueue};
use crate::scheduler::SchedulerStore;
use crate::security::{ApprovalFlow, SecurityEngine};
use crate::skills::SkillManager;

// ANSI shorthands, matching the plain-escape style used elsewhere.
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Background-agent event types that stay out of the main window; they
/// are observed via the worker activity log instead.
const SILENCED_FOR_BACKGROUND: [&str; 6] = [
    event_type::AGENT_THINKING,
    event_type::SKILL_TOOL_CALL,
    event_type::SKILL_TOOL_RESULT,
    event_type::LLM_REQUEST,
    event_type::LLM_CHUNK,
    event_type::LLM_RESPONSE,
];

/// Should this event be rendered in the main window?
pub fn should_display(event: &Event) -> bool {
    if event.source == "main" {
        return true;
    }
    !SILENCED_FOR_BACKGROUND.contains(&event.event_type.as_str())
}

/// Build the single user→agent message for a turn, prepending drained
/// background results when there are any.
pub fn build_turn_message(drained: &[Notification], user_input: &str) -> String {
    if drained.is_empty() {
        return user_input.to_string();
    }
    let mut out = String::from(
        "The following background task(s) completed while you were busy. \
         Mention the key findings to the user before responding to their message.\n",
    );
    for n in drained {
        let time = chrono::Local
            .timestamp_opt(n.fired_at, 0)
            .single()
            .map(|dt| dt.format("%H:%M").to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "\n[Background task: \"{}\" completed at {time}]\n{}\n",
            n.job_name, n.content
        ));
    }
    out.push_str(&format!("\n---\nUser message: {user_input}"));
    out
}

// ─── Shared stdin reader ─────────────────────────────────────────────────────

/// One reader task owns stdin; the prompt loop and the approval /
/// escalation prompts take turns pulling lines from it.
pub struct InputReader {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl InputReader {
    pub fn spawn() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Arc::new(Self {
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

// ─── CliPlatform ─────────────────────────────────────────────────────────────

pub struct CliPlatformDeps {
    pub kernel: Arc<Kernel>,
    pub approval: Arc<ApprovalFlow>,
    pub escalation: Arc<EscalationBus>,
    pub queue: Arc<PendingQueue>,
    pub cli_channel: Arc<CliChannel>,
    pub cost: Arc<CostTracker>,
    pub skills: Arc<SkillManager>,
    pub security: Arc<SecurityEngine>,
    pub scheduler_store: Arc<SchedulerStore>,
    pub memory_manager: Option<Arc<dyn MemoryManager>>,
    pub agent_name: String,
}

pub struct CliPlatform {
    deps: CliPlatformDeps,
    turn_in_progress: Arc<AtomicBool>,
    input: Arc<InputReader>,
}

impl CliPlatform {
    pub fn new(deps: CliPlatformDeps) -> Self {
        Self {
            deps,
            turn_in_progress: Arc::new(AtomicBool::new(false)),
            input: InputReader::spawn(),
        }
    }

    /// Drive the interactive session until `/exit` or EOF.
    pub async fn run(&self, mut agent: AgentLoop) {
        self.deps.cli_channel.set_active(true);
        let display_sub = self.subscribe_display();
        let watcher = self.spawn_watcher();

        println!();
        println!("┌──────────────────────────────────────────────┐");
        println!(
            "│ {BOLD}{}{RESET} is ready. {DIM}/help for commands, /exit to quit.{RESET}",
            self.deps.agent_name
        );
        println!("└──────────────────────────────────────────────┘");

        loop {
            print!("\n{BOLD}You >{RESET} ");
            flush_stdout();
            let Some(line) = self.input.next_line().await else {
                break; // EOF
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix('/') {
                if !self.handle_command(command, &mut agent).await {
                    break;
                }
                continue;
            }

            self.process_message(&line, &mut agent).await;
        }

        watcher.abort();
        self.deps.kernel.bus.unsubscribe("*", display_sub);
        self.deps.cli_channel.set_active(false);
        println!("\n{DIM}Goodbye!{RESET}");
    }

    // ── Turn processing ──────────────────────────────────────────────────────

    async fn process_message(&self, user_input: &str, agent: &mut AgentLoop) {
        let drained = self.deps.queue.drain();
        let message = build_turn_message(&drained, user_input);

        self.turn_in_progress.store(true, Ordering::SeqCst);
        println!();

        // Print chunks as the agent streams them.
        let (tx, mut rx): (ChunkSink, _) = mpsc::unbounded_channel();
        let agent_name = self.deps.agent_name.clone();
        let printer = tokio::spawn(async move {
            let mut started = false;
            while let Some(chunk) = rx.recv().await {
                if !started && !chunk.trim().is_empty() {
                    started = true;
                    println!("{BOLD}{CYAN}{agent_name}{RESET}");
                }
                print!("{chunk}");
                flush_stdout();
            }
            started
        });

        let result = agent.run(&message, &tx).await;
        drop(tx);
        let printed_any = printer.await.unwrap_or(false);

        match result {
            Ok(_) => {
                if printed_any {
                    println!();
                } else {
                    println!("{DIM}Done.{RESET}");
                }
            }
            Err(e) => println!("\n{RED}Error: {e}{RESET}"),
        }
        self.turn_in_progress.store(false, Ordering::SeqCst);
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Returns `false` when the session should end.
    async fn handle_command(&self, command: &str, agent: &mut AgentLoop) -> bool {
        let mut parts = command.split_whitespace();
        let head = parts.next().unwrap_or("").to_ascii_lowercase();
        let rest: Vec<&str> = parts.collect();

        match head.as_str() {
            "exit" | "quit" | "q" => return false,
            "help" | "h" | "?" => self.show_help(),
            "cost" => self.show_cost(),
            "skills" => self.show_skills(),
            "perms" => self.show_perms(),
            "clear" => {
                agent.reset();
                println!("{DIM}Conversation cleared{RESET}");
            }
            "jobs" => self.handle_jobs(&rest).await,
            "memory" => self.handle_memory(&rest).await,
            other => println!("{DIM}Unknown command: /{other}{RESET}"),
        }
        true
    }

    fn show_help(&self) {
        println!(
            "{BOLD}Commands{RESET}\n\
             \x20 {CYAN}/help{RESET}    — Show this help\n\
             \x20 {CYAN}/cost{RESET}    — Token usage and cost this session\n\
             \x20 {CYAN}/skills{RESET}  — Registered skills and tools\n\
             \x20 {CYAN}/memory{RESET}  — Episodic memory (/memory forget <id>)\n\
             \x20 {CYAN}/jobs{RESET}    — Scheduled jobs (/jobs cancel <name>)\n\
             \x20 {CYAN}/perms{RESET}   — Remembered permission decisions\n\
             \x20 {CYAN}/clear{RESET}   — Clear conversation history\n\
             \x20 {CYAN}/exit{RESET}    — Exit the chat"
        );
    }

    fn show_cost(&self) {
        let s = self.deps.cost.summary();
        println!(
            "{BOLD}Session cost{RESET}\n\
             \x20 Requests:      {}\n\
             \x20 Input tokens:  {}\n\
             \x20 Output tokens: {}\n\
             \x20 Total tokens:  {}\n\
             \x20 Cost:          ${:.4}",
            s.requests, s.input_tokens, s.output_tokens, s.total_tokens, s.cost_usd
        );
    }

    fn show_skills(&self) {
        let names = self.deps.skills.skill_names();
        if names.is_empty() {
            println!("{DIM}No skills registered{RESET}");
            return;
        }
        println!("{BOLD}Skills{RESET}");
        for name in names {
            if let Some(skill) = self.deps.skills.get_skill(&name) {
                let manifest = skill.manifest();
                let tools: Vec<String> = manifest.tools.iter().map(|t| t.name.clone()).collect();
                println!("  {CYAN}{name}{RESET} — {} [{}]", manifest.description, tools.join(", "));
            }
        }
    }

    fn show_perms(&self) {
        let remembered = self.deps.security.remembered_decisions();
        if remembered.is_empty() {
            println!("{DIM}No remembered permission decisions{RESET}");
            return;
        }
        println!("{BOLD}Remembered decisions{RESET}");
        for (tool, capability, response) in remembered {
            println!("  {tool} / {capability} → {}", response.as_str());
        }
    }

    async fn handle_jobs(&self, args: &[&str]) {
        match args {
            ["cancel", name] => {
                let job = self.deps.scheduler_store.get_by_name(name).await.ok().flatten();
                match job {
                    Some(job) => {
                        let _ = self.deps.scheduler_store.delete(&job.id).await;
                        println!("Cancelled job '{}'", job.name);
                    }
                    None => println!("{RED}No job named '{name}'{RESET}"),
                }
            }
            _ => match self.deps.scheduler_store.get_all(false).await {
                Ok(jobs) if jobs.is_empty() => println!("{DIM}No scheduled jobs{RESET}"),
                Ok(jobs) => {
                    println!("{BOLD}Scheduled jobs{RESET}");
                    for job in jobs {
                        println!(
                            "  {CYAN}{}{RESET} [{}] {} {}",
                            job.name,
                            job.id,
                            job.trigger.describe(),
                            if job.active { "" } else { "(inactive)" }
                        );
                    }
                }
                Err(e) => println!("{RED}jobs: {e}{RESET}"),
            },
        }
    }

    async fn handle_memory(&self, args: &[&str]) {
        let Some(mm) = &self.deps.memory_manager else {
            println!("{DIM}Long-term memory is not enabled{RESET}");
            return;
        };
        match args {
            ["forget", id] => match mm.forget(id).await {
                Ok(true) => println!("Forgot memory entry '{id}'"),
                Ok(false) => println!("{RED}No memory entry '{id}'{RESET}"),
                Err(e) => println!("{RED}memory: {e}{RESET}"),
            },
            _ => match mm.list_episodic(20).await {
                Ok(entries) if entries.is_empty() => println!("{DIM}No episodic memories yet{RESET}"),
                Ok(entries) => {
                    println!("{BOLD}Episodic memory{RESET}");
                    for entry in entries {
                        let preview: String = entry.content.chars().take(70).collect();
                        println!("  [{}] {preview}", entry.id);
                    }
                }
                Err(e) => println!("{RED}memory: {e}{RESET}"),
            },
        }
    }

    // ── Event display ────────────────────────────────────────────────────────

    fn subscribe_display(&self) -> crate::core::SubscriptionId {
        let approval = Arc::clone(&self.deps.approval);
        let escalation = Arc::clone(&self.deps.escalation);
        let input = Arc::clone(&self.input);

        self.deps.kernel.on("*", move |event| {
            let approval = Arc::clone(&approval);
            let escalation = Arc::clone(&escalation);
            let input = Arc::clone(&input);
            async move {
                if !should_display(&event) {
                    return Ok(());
                }
                match event.event_type.as_str() {
                    event_type::SECURITY_APPROVAL => {
                        tokio::spawn(prompt_approval(event, approval, input));
                    }
                    event_type::AGENT_ESCALATION => {
                        tokio::spawn(prompt_escalation(event, escalation, input));
                    }
                    _ => render_event(&event),
                }
                Ok(())
            }
        })
    }

    // ── Watcher ──────────────────────────────────────────────────────────────

    /// While the user is idle, drain the pending queue roughly once a
    /// second and render each notification immediately.
    fn spawn_watcher(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.deps.queue);
        let turn_in_progress = Arc::clone(&self.turn_in_progress);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                ticker.tick().await;
                if turn_in_progress.load(Ordering::SeqCst) || queue.is_empty() {
                    continue;
                }
                for notification in queue.drain() {
                    render_notification(&notification);
                }
            }
        })
    }
}

// ─── Rendering helpers ───────────────────────────────────────────────────────

fn render_event(event: &Event) {
    match event.event_type.as_str() {
        event_type::AGENT_THINKING => {
            let iteration = event.data.get("iteration").and_then(Value::as_u64).unwrap_or(1);
            if iteration == 1 {
                println!("{DIM}Thinking...{RESET}");
            } else {
                println!("{DIM}Analyzing...{RESET}");
            }
        }
        event_type::SKILL_TOOL_CALL => {
            let tool = event.data_str("tool").unwrap_or("unknown");
            let args = event
                .data
                .get("arguments")
                .and_then(Value::as_object)
                .map(|args| {
                    args.iter()
                        .take(2)
                        .map(|(k, v)| match v {
                            Value::String(s) if s.chars().count() > 25 => {
                                let short: String = s.chars().take(25).collect();
                                format!("{k}=\"{short}...\"")
                            }
                            Value::String(s) => format!("{k}=\"{s}\""),
                            other => format!("{k}={other}"),
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            println!("{YELLOW}⟳{RESET} {BOLD}{tool}{RESET}({args})");
        }
        event_type::SKILL_TOOL_RESULT => {
            let success = event.data.get("success").and_then(Value::as_bool).unwrap_or(false);
            let preview = event.data_str("output_preview").unwrap_or("");
            let icon = if success {
                format!("{GREEN}✓{RESET}")
            } else {
                format!("{RED}✗{RESET}")
            };
            let line: String = preview.replace('\n', " ").trim().chars().take(60).collect();
            if line.is_empty() {
                println!("  {icon} {DIM}Done{RESET}");
            } else {
                println!("  {icon} {DIM}{line}{RESET}");
            }
        }
        event_type::AGENT_SPAWNED => {
            let name = event
                .data_str("task_name")
                .or_else(|| event.data_str("task_id"))
                .unwrap_or("background task");
            println!("{YELLOW}⟳{RESET} {DIM}Worker '{name}' started{RESET}");
        }
        event_type::AGENT_TASK_COMPLETE => {
            let name = event
                .data_str("task_name")
                .or_else(|| event.data_str("task_id"))
                .unwrap_or("background task");
            let success = event.data.get("success").and_then(Value::as_bool).unwrap_or(true);
            let icon = if success { GREEN } else { RED };
            println!("{icon}●{RESET} {DIM}Worker '{name}' finished{RESET}");
        }
        event_type::SECURITY_DENIED => {
            let reason = event.data_str("reason").unwrap_or("denied");
            println!("  {RED}✗{RESET} {DIM}Permission denied: {reason}{RESET}");
        }
        _ => {}
    }
}

fn render_notification(notification: &Notification) {
    let time = chrono::Local
        .timestamp_opt(notification.fired_at, 0)
        .single()
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default();
    println!();
    println!("┌{}", "─".repeat(58));
    println!("│ {BOLD}{}{RESET} {DIM}({time}){RESET}", notification.job_name);
    for line in notification.content.lines() {
        println!("│ {line}");
    }
    println!("└{}", "─".repeat(58));
    flush_stdout();
}

async fn prompt_approval(event: Event, approval: Arc<ApprovalFlow>, input: Arc<InputReader>) {
    let request_id = event.data_str("request_id").unwrap_or_default().to_string();
    let tool = event.data_str("tool_name").unwrap_or("unknown tool");
    let description = event.data_str("tool_description").unwrap_or("");
    let capabilities = event
        .data
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|caps| {
            caps.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    println!();
    println!("{YELLOW}⚠ Permission needed{RESET}: {BOLD}{tool}{RESET} — {description}");
    println!("  {DIM}capabilities: {capabilities}{RESET}");
    println!("  [1] allow once  [2] allow always  [3] deny  [4] deny always");
    print!("  choice > ");
    flush_stdout();

    let response = match input.next_line().await.as_deref().map(str::trim) {
        Some("1") | Some("allow_once") => ApprovalResponse::AllowOnce,
        Some("2") | Some("allow_always") => ApprovalResponse::AllowAlways,
        Some("4") | Some("deny_always") => ApprovalResponse::DenyAlways,
        _ => ApprovalResponse::Deny,
    };
    if !approval.resolve_approval(&request_id, response) {
        println!("{DIM}(request {request_id} already resolved or timed out){RESET}");
    }
}

async fn prompt_escalation(event: Event, escalation: Arc<EscalationBus>, input: Arc<InputReader>) {
    let escalation_id = event.data_str("escalation_id").unwrap_or_default().to_string();
    let from_agent = event.data_str("from_agent").unwrap_or("background agent");
    let question = event.data_str("question").unwrap_or("");

    println!();
    println!("{CYAN}❓ {from_agent} asks{RESET}: {question}");
    print!("  answer > ");
    flush_stdout();

    if let Some(answer) = input.next_line().await {
        if !escalation.resolve_escalation(&escalation_id, answer.trim()) {
            println!("{DIM}(escalation {escalation_id} already resolved or timed out){RESET}");
        }
    }
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

// ─── Tests ────────────────────────────────────────────────────────────────────
