//! TOML configuration schema.
//!
//! All sections have `#[serde(default)]` so a partially-filled
//! `config.toml` works; missing sections fall back to their `Default`.
//!
//! Example `~/.arc/config.toml`:
//! ```toml
//! [agent]
//! name = "arc"
//! max_iterations = 25
//!
//! [security]
//! auto_allow = ["file:read"]
//! always_ask = ["file:write", "file:delete", "shell:exec"]
//!
//! [llm]
//! default_provider = "ollama"
//! default_model = "llama3.1"
//! base_url = "http://localhost:11434"
//!
//! [telegram]
//! token = "${TELEGRAM_BOT_TOKEN}"
//! chat_id = "123456789"
//! ```

use serde::{Deserialize, Serialize};

// ─── AgentSection ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    pub name: String,
    pub max_iterations: u32,
    /// Wall-clock bound for a single tool execution, seconds.
    pub tool_timeout: u64,
    pub temperature: f32,
    /// Number of recent messages kept when the context must shrink.
    pub recent_window: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "arc".to_owned(),
            max_iterations: 25,
            tool_timeout: 120,
            temperature: 0.7,
            recent_window: 20,
        }
    }
}

// ─── SecuritySection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecuritySection {
    /// Capabilities granted without asking.
    pub auto_allow: Vec<String>,
    /// Capabilities that always require an interactive approval.
    pub always_ask: Vec<String>,
    /// Capabilities denied with no override path.
    pub never_allow: Vec<String>,
    /// Seconds to wait for an interactive approval before denying.
    pub approval_timeout: u64,
    pub workspace: String,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            auto_allow: vec!["file:read".to_owned()],
            always_ask: vec![
                "file:write".to_owned(),
                "file:delete".to_owned(),
                "shell:exec".to_owned(),
            ],
            never_allow: Vec::new(),
            approval_timeout: 300,
            workspace: ".".to_owned(),
        }
    }
}

// ─── MemorySection ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemorySection {
    pub backend: String,
    pub path: String,
    pub enable_long_term: bool,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_owned(),
            path: "~/.arc/memory".to_owned(),
            enable_long_term: true,
        }
    }
}

// ─── CostSection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostSection {
    pub enabled: bool,
    pub session_limit_usd: f64,
    pub warn_at_percent: f64,
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            enabled: true,
            session_limit_usd: 5.0,
            warn_at_percent: 0.8,
        }
    }
}

// ─── LlmSection ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSection {
    pub default_provider: String,
    pub default_model: String,
    pub base_url: String,
    pub api_key: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            default_provider: "ollama".to_owned(),
            default_model: "llama3.1".to_owned(),
            base_url: "http://localhost:11434".to_owned(),
            api_key: String::new(),
        }
    }
}

// ─── ShellSection ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellSection {
    pub provider: String,
    pub timeout: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            provider: "auto".to_owned(),
            timeout: 30,
        }
    }
}

// ─── IdentitySection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentitySection {
    pub path: String,
    pub personality: String,
    pub user_name: Option<String>,
    pub agent_name: String,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            path: "~/.arc/identity.md".to_owned(),
            personality: "helpful".to_owned(),
            user_name: None,
            agent_name: "Arc".to_owned(),
        }
    }
}

// ─── TelegramSection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TelegramSection {
    pub token: String,
    pub chat_id: String,
}

impl TelegramSection {
    /// The channel is only active when both values are set.
    pub fn configured(&self) -> bool {
        !self.token.is_empty() && !self.chat_id.is_empty()
    }
}

// ─── SchedulerSection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSection {
    pub enabled: bool,
    pub db_path: String,
    /// Seconds between due-job checks.
    pub poll_interval: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "~/.arc/scheduler.db".to_owned(),
            poll_interval: 30,
        }
    }
}

// ─── ArcConfig ────────────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ArcConfig {
    pub agent: AgentSection,
    pub security: SecuritySection,
    pub memory: MemorySection,
    pub cost: CostSection,
    pub llm: LlmSection,
    pub shell: ShellSection,
    pub identity: IdentitySection,
    pub telegram: TelegramSection,
    pub scheduler: SchedulerSection,
}

impl ArcConfig {
    /// The Arc home directory, derived from the identity path.
    pub fn arc_home(&self) -> std::path::PathBuf {
        expand_home(&self.identity.path)
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(|| std::path::PathBuf::from("."))
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
