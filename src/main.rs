//! `arc` — headless CLI for the agent runtime.
//!
//! Subcommands: `init` (first-time setup), `chat` (interactive
//! session), `workers` (tail the worker activity log), `logs`,
//! `config`, `version`.

use std::{
    io::Write,
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use serde_json::json;

use arc_agent::agent::{AgentLoop, AgentLoopConfig, AgentRegistry, WorkerActivityLog};
use arc_agent::config::{self, expand_home, ArcConfig};
use arc_agent::core::{EscalationBus, Kernel};
use arc_agent::identity::SoulManager;
use arc_agent::llm::{LlmProvider, OllamaProvider};
use arc_agent::memory::{InMemoryManager, MemoryManager};
use arc_agent::middleware::{CostTracker, EventLogMiddleware};
use arc_agent::notifications::{
    CliChannel, FileChannel, NotificationRouter, PendingQueue, TelegramChannel,
};
use arc_agent::platforms::{CliPlatform, cli::CliPlatformDeps};
use arc_agent::scheduler::{AgentFactory, SchedulerEngine, SchedulerStore};
use arc_agent::security::{ApprovalFlow, SecurityEngine};
use arc_agent::skills::{SchedulerSkill, Skill, SkillManager, WorkerDeps, WorkerSkill};

#[derive(Parser, Debug)]
#[command(
    name = "arc",
    about = "Arc — a personal agent runtime",
    version,
    long_about = "Personal agent runtime: interactive chat, background workers, \
                  and scheduled jobs with capability-gated tools."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// First-time setup: create config and identity files.
    Init {
        /// Overwrite an existing configuration.
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Start an interactive chat session.
    Chat {
        /// Override the configured model.
        #[arg(long, short = 'm')]
        model: Option<String>,
    },
    /// Tail the worker activity log.
    Workers {
        /// Keep following the log as new lines arrive.
        #[arg(long)]
        follow: bool,
        /// Number of trailing lines to show.
        #[arg(long, default_value_t = 30)]
        lines: usize,
    },
    /// Show recent runtime logs.
    Logs {
        /// Show the structured events JSONL instead of the text log.
        #[arg(long)]
        events: bool,
        #[arg(long, default_value_t = 50)]
        lines: usize,
    },
    /// Print the resolved configuration.
    Config,
    /// Print the version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("\x1b[31merror\x1b[0m: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Init { force } => handle_init(force),
        Commands::Chat { model } => runtime.block_on(handle_chat(model)),
        Commands::Workers { follow, lines } => runtime.block_on(handle_workers(follow, lines)),
        Commands::Logs { events, lines } => handle_logs(events, lines),
        Commands::Config => handle_config(),
        Commands::Version => {
            println!("arc {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    }
}

// ─── init ────────────────────────────────────────────────────────────────────

fn handle_init(force: bool) -> ExitCode {
    let config_path = config::default_user_config_path();
    if config_path.exists() && !force {
        println!(
            "Arc is already configured at {}\n\x1b[2mUse --force to reconfigure\x1b[0m",
            config_path.display()
        );
        return ExitCode::SUCCESS;
    }

    let agent_name = ask("Agent name", "Arc");
    let user_name = ask("Your name", "User");

    println!("\nPersonalities:");
    for p in arc_agent::identity::list_personalities() {
        println!("  {} {:<12} — {}", p.emoji, p.id, p.description);
    }
    let personality = ask("Personality", "helpful");

    let config = ArcConfig::default();
    let home = config.arc_home();
    if let Err(e) = std::fs::create_dir_all(&home) {
        eprintln!("\x1b[31merror\x1b[0m: cannot create {}: {e}", home.display());
        return ExitCode::FAILURE;
    }

    let mut config = config;
    config.identity.agent_name = agent_name.clone();
    config.identity.user_name = Some(user_name.clone());
    config.identity.personality = personality.clone();

    let rendered = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("\x1b[31merror\x1b[0m: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::write(&config_path, rendered) {
        eprintln!("\x1b[31merror\x1b[0m: cannot write config: {e}");
        return ExitCode::FAILURE;
    }

    let soul = SoulManager::new(&expand_home(&config.identity.path));
    if let Err(e) = soul.create(&agent_name, &user_name, &personality) {
        eprintln!("\x1b[31merror\x1b[0m: cannot write identity: {e}");
        return ExitCode::FAILURE;
    }
    // Soft skills live here; seeded empty.
    let _ = std::fs::create_dir_all(home.join("skills"));

    println!("\nConfigured. Start chatting with: \x1b[1marc chat\x1b[0m");
    ExitCode::SUCCESS
}

fn ask(prompt: &str, default: &str) -> String {
    print!("{prompt} [{default}]: ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return default.to_string();
    }
    let answer = line.trim();
    if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    }
}

// ─── chat ────────────────────────────────────────────────────────────────────

async fn handle_chat(model_override: Option<String>) -> ExitCode {
    let config_path = config::default_user_config_path();
    if !config_path.exists() {
        eprintln!("Arc is not configured yet.\n\x1b[2mRun \x1b[0m\x1b[1marc init\x1b[0m\x1b[2m first.\x1b[0m");
        return ExitCode::FAILURE;
    }

    let mut config = match config::load_default() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\x1b[31merror\x1b[0m: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(model) = model_override {
        config.llm.default_model = model;
    }

    let home = config.arc_home();
    arc_agent::logging::init(&home.join("logs"));

    // ── Kernel, bus middleware ───────────────────────────────────────────────
    let kernel = Kernel::new(config.clone());
    let cost = Arc::new(CostTracker::new());
    kernel.use_middleware(Arc::new(EventLogMiddleware::new(Some(home.join("logs")))));
    kernel.use_middleware(Arc::clone(&cost) as Arc<dyn arc_agent::core::Middleware>);

    // ── LLM provider ─────────────────────────────────────────────────────────
    let ollama = Arc::new(OllamaProvider::new(&config.llm.base_url, &config.llm.default_model));
    kernel.registry.register("llm", &config.llm.default_provider, Arc::clone(&ollama));
    let llm: Arc<dyn LlmProvider> = ollama;
    let info = llm.model_info();
    cost.set_pricing(info.cost_per_input_token, info.cost_per_output_token);

    // ── Security ─────────────────────────────────────────────────────────────
    let approval = Arc::new(ApprovalFlow::with_timeout(
        Arc::clone(&kernel.bus),
        Duration::from_secs(config.security.approval_timeout),
    ));
    let security = Arc::new(SecurityEngine::new(&config.security, Arc::clone(&approval)));
    let escalation = Arc::new(EscalationBus::new(Arc::clone(&kernel.bus)));

    // ── Skills ───────────────────────────────────────────────────────────────
    let skills = Arc::new(SkillManager::new(Arc::clone(&kernel)));
    let worker_skill = WorkerSkill::new();
    let scheduler_skill = SchedulerSkill::new();
    for (skill, name) in [
        (Arc::clone(&worker_skill) as Arc<dyn Skill>, "worker"),
        (Arc::clone(&scheduler_skill) as Arc<dyn Skill>, "scheduler"),
    ] {
        if let Err(e) = skills.register(skill, json!({})).await {
            log::warn!("skill '{name}' registration failed: {e}");
        }
    }

    // ── Scheduler store ──────────────────────────────────────────────────────
    let scheduler_store = Arc::new(SchedulerStore::new(&expand_home(&config.scheduler.db_path)));
    if let Err(e) = scheduler_store.initialize().await {
        eprintln!("\x1b[31merror\x1b[0m: scheduler store: {e}");
        return ExitCode::FAILURE;
    }
    scheduler_skill.set_store(Arc::clone(&scheduler_store));

    // ── Notifications ────────────────────────────────────────────────────────
    let router = Arc::new(NotificationRouter::new());
    let queue = PendingQueue::new();
    let cli_channel = CliChannel::new(Arc::clone(&queue));
    router.register(Arc::clone(&cli_channel) as _);
    if config.telegram.configured() {
        router.register(Arc::new(TelegramChannel::new(
            &config.telegram.token,
            &config.telegram.chat_id,
        )));
        log::info!("telegram channel registered");
    }
    router.register(Arc::new(FileChannel::new(home.join("notifications.log"))));

    // ── Agent registry + worker log ──────────────────────────────────────────
    let agent_registry = AgentRegistry::new();
    let worker_log = Arc::new(WorkerActivityLog::new(home.join("worker_activity.log")));
    if let Err(e) = worker_log.open() {
        log::warn!("worker activity log unavailable: {e}");
    }
    let worker_log_handler = Arc::clone(&worker_log);
    kernel.on("*", move |event| {
        let worker_log = Arc::clone(&worker_log_handler);
        async move {
            worker_log.handle(&event);
            Ok(())
        }
    });

    // ── Long-term memory (external contract; in-process stand-in) ────────────
    let memory_manager: Option<Arc<dyn MemoryManager>> = if config.memory.enable_long_term {
        Some(Arc::new(InMemoryManager::new()))
    } else {
        None
    };

    // ── Worker skill wiring ──────────────────────────────────────────────────
    worker_skill.set_dependencies(WorkerDeps {
        kernel: Arc::clone(&kernel),
        llm: Arc::clone(&llm),
        skill_manager: Arc::clone(&skills),
        notification_router: Arc::clone(&router),
        agent_registry: Arc::clone(&agent_registry),
    });

    // ── System prompt ────────────────────────────────────────────────────────
    let soul = SoulManager::new(&expand_home(&config.identity.path));
    let identity = soul.load();
    let soft = arc_agent::skills::load_soft_skills(&home.join("skills"));
    let mut system_prompt = identity.system_prompt.clone();
    system_prompt.push_str(&format!(
        "\n\nEnvironment:\n- OS: {}\n- Working directory: {}\n",
        std::env::consts::OS,
        std::env::current_dir().map(|d| d.display().to_string()).unwrap_or_default(),
    ));
    let soft_section = arc_agent::skills::soft::render_section(&soft);
    if !soft_section.is_empty() {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(&soft_section);
    }

    // ── Scheduler engine ─────────────────────────────────────────────────────
    let engine = if config.scheduler.enabled {
        let factory_kernel = Arc::clone(&kernel);
        let factory_llm = Arc::clone(&llm);
        let factory_skills = Arc::clone(&skills);
        let factory: AgentFactory = Box::new(move |agent_id: &str| {
            AgentLoop::new(
                Arc::clone(&factory_kernel),
                Arc::clone(&factory_llm),
                Arc::clone(&factory_skills),
                Arc::new(SecurityEngine::permissive()),
                "You are a helpful proactive assistant completing a scheduled task. \
                 Be concise and clear. Do not ask follow-up questions.",
                AgentLoopConfig {
                    agent_id: agent_id.to_string(),
                    excluded_skills: ["scheduler".to_string(), "worker".to_string()]
                        .into_iter()
                        .collect(),
                    ..Default::default()
                },
                None,
            )
        });
        let engine = SchedulerEngine::new(
            Arc::clone(&scheduler_store),
            Arc::clone(&llm),
            factory,
            Arc::clone(&router),
            Arc::clone(&kernel),
            Some(Arc::clone(&agent_registry)),
            Duration::from_secs(config.scheduler.poll_interval),
        );
        Arc::clone(&engine).start().await;
        Some(engine)
    } else {
        None
    };

    kernel.start().await;

    // ── Main agent + interactive platform ────────────────────────────────────
    let agent = AgentLoop::new(
        Arc::clone(&kernel),
        Arc::clone(&llm),
        Arc::clone(&skills),
        Arc::clone(&security),
        &system_prompt,
        AgentLoopConfig {
            max_iterations: config.agent.max_iterations,
            temperature: config.agent.temperature,
            recent_window: config.agent.recent_window,
            agent_id: "main".to_string(),
            ..Default::default()
        },
        memory_manager.clone(),
    );

    let platform = CliPlatform::new(CliPlatformDeps {
        kernel: Arc::clone(&kernel),
        approval: Arc::clone(&approval),
        escalation: Arc::clone(&escalation),
        queue: Arc::clone(&queue),
        cli_channel: Arc::clone(&cli_channel),
        cost: Arc::clone(&cost),
        skills: Arc::clone(&skills),
        security: Arc::clone(&security),
        scheduler_store: Arc::clone(&scheduler_store),
        memory_manager: memory_manager.clone(),
        agent_name: identity.agent_name.clone(),
    });

    platform.run(agent).await;

    // ── Shutdown cascade ─────────────────────────────────────────────────────
    // Registry → scheduler → store close → skills → LLM client → memory store.
    agent_registry.shutdown_all().await;
    if let Some(engine) = engine {
        engine.stop().await;
    }
    scheduler_store.close().await;
    skills.shutdown_all().await;
    llm.close().await;
    if let Some(mm) = &memory_manager {
        if let Err(e) = mm.close().await {
            log::warn!("memory store close failed: {e}");
        }
    }
    approval.cancel_all();
    worker_log.close();
    kernel.stop().await;

    ExitCode::SUCCESS
}

// ─── workers ─────────────────────────────────────────────────────────────────

async fn handle_workers(follow: bool, lines: usize) -> ExitCode {
    let path = default_home().join("worker_activity.log");
    if !path.exists() {
        println!("\x1b[2mNo worker activity yet ({}).\x1b[0m", path.display());
        return ExitCode::SUCCESS;
    }

    let mut offset = print_tail(&path, lines);
    if !follow {
        return ExitCode::SUCCESS;
    }

    println!("\x1b[2m(following — Ctrl+C to stop)\x1b[0m");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                offset = print_from(&path, offset);
            }
        }
    }
    ExitCode::SUCCESS
}

/// Print the last `lines` lines; returns the file length consumed.
fn print_tail(path: &std::path::Path, lines: usize) -> u64 {
    let Ok(content) = std::fs::read_to_string(path) else {
        return 0;
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{line}");
    }
    content.len() as u64
}

/// Print anything appended past `offset`; returns the new offset.
fn print_from(path: &std::path::Path, offset: u64) -> u64 {
    let Ok(content) = std::fs::read_to_string(path) else {
        return offset;
    };
    let len = content.len() as u64;
    if len > offset {
        // Rotation or truncation resets the offset.
        let start = if offset <= len { offset as usize } else { 0 };
        print!("{}", &content[start..]);
        let _ = std::io::stdout().flush();
    }
    len
}

// ─── logs ────────────────────────────────────────────────────────────────────

fn handle_logs(events: bool, lines: usize) -> ExitCode {
    let logs_dir = default_home().join("logs");
    let Ok(entries) = std::fs::read_dir(&logs_dir) else {
        println!("\x1b[2mNo logs yet ({}).\x1b[0m", logs_dir.display());
        return ExitCode::SUCCESS;
    };

    // Newest file of the requested kind.
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if events {
                name.starts_with("events_") && name.ends_with(".jsonl")
            } else {
                name.starts_with("arc.log")
            }
        })
        .collect();
    candidates.sort();

    match candidates.last() {
        Some(path) => {
            print_tail(path, lines);
            ExitCode::SUCCESS
        }
        None => {
            println!("\x1b[2mNo matching log files in {}.\x1b[0m", logs_dir.display());
            ExitCode::SUCCESS
        }
    }
}

// ─── config ──────────────────────────────────────────────────────────────────

fn handle_config() -> ExitCode {
    match config::load_default() {
        Ok(config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("\x1b[31merror\x1b[0m: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("\x1b[31merror\x1b[0m: {e}");
            ExitCode::FAILURE
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".arc")
}
