//! Job model and trigger time functions.
//!
//! Triggers serialize as tagged JSON so they round-trip cleanly
//! through the SQLite store:
//!
//! ```json
//! {"type": "cron", "expression": "0 9 * * 1-5"}
//! {"type": "interval", "seconds": 1800}
//! {"type": "oneshot", "at": 1740481200}
//! ```

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ArcError;

// ─── Trigger ─────────────────────────────────────────────────────────────────

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// 5-field cron expression, e.g. `"0 9 * * 1-5"`.
    Cron { expression: String },
    /// Every `seconds` seconds; fires immediately on first run.
    Interval { seconds: u64 },
    /// Once at a unix timestamp, then never again.
    Oneshot { at: i64 },
}

impl Trigger {
    /// Validate at creation time so a bad cron expression is rejected
    /// before the job is stored.
    pub fn validate(&self) -> Result<(), ArcError> {
        match self {
            Trigger::Cron { expression } => {
                parse_cron(expression).map(|_| ()).map_err(|e| {
                    ArcError::Config(format!("invalid cron expression '{expression}': {e}"))
                })
            }
            Trigger::Interval { seconds } => {
                if *seconds < 1 {
                    return Err(ArcError::Config("interval must be at least 1 second".into()));
                }
                Ok(())
            }
            Trigger::Oneshot { .. } => Ok(()),
        }
    }

    /// The next unix timestamp at which this job should fire, or `0` if
    /// the trigger has expired (one-shots after firing or past due).
    ///
    /// `last_run = 0` means the job has never run.
    pub fn next_fire_time(&self, last_run: i64, now: i64) -> i64 {
        match self {
            Trigger::Cron { expression } => {
                let base = if last_run > 0 { last_run } else { now };
                let Ok(schedule) = parse_cron(expression) else {
                    return 0;
                };
                let base_dt: DateTime<Utc> = match Utc.timestamp_opt(base, 0).single() {
                    Some(dt) => dt,
                    None => return 0,
                };
                schedule
                    .after(&base_dt)
                    .next()
                    .map(|dt| dt.timestamp())
                    .unwrap_or(0)
            }
            Trigger::Interval { seconds } => {
                if last_run == 0 {
                    now // fire immediately on first run
                } else {
                    last_run + *seconds as i64
                }
            }
            Trigger::Oneshot { at } => {
                if last_run > 0 || now > *at {
                    0 // already fired or past due
                } else {
                    *at
                }
            }
        }
    }

    /// Human-readable description for `/jobs` output.
    pub fn describe(&self) -> String {
        match self {
            Trigger::Cron { expression } => format!("cron({expression})"),
            Trigger::Interval { seconds } => {
                let s = *seconds;
                if s % 3600 == 0 {
                    format!("every {}h", s / 3600)
                } else if s % 60 == 0 {
                    format!("every {}m", s / 60)
                } else {
                    format!("every {s}s")
                }
            }
            Trigger::Oneshot { at } => {
                let when = Utc
                    .timestamp_opt(*at, 0)
                    .single()
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| at.to_string());
                format!("once at {when}")
            }
        }
    }
}

/// The `cron` crate wants a 6-field expression (with seconds); accept
/// the standard 5-field form by prepending a zero seconds field.
fn parse_cron(expression: &str) -> Result<cron::Schedule, cron::error::Error> {
    let full = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    cron::Schedule::from_str(&full)
}

// ─── Job ─────────────────────────────────────────────────────────────────────

/// A scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Human-readable label, unique per store.
    pub name: String,
    /// What to ask the LLM when this fires.
    pub prompt: String,
    pub trigger: Trigger,
    /// Unix timestamp; 0 means "compute on next scheduler pass".
    pub next_run: i64,
    /// Unix timestamp; 0 means never run.
    pub last_run: i64,
    pub active: bool,
    /// false = plain LLM text; true = full sub-agent with tools.
    pub use_tools: bool,
    pub created_at: i64,
}

impl Job {
    pub fn new(name: &str, prompt: &str, trigger: Trigger) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            trigger,
            next_run: 0,
            last_run: 0,
            active: true,
            use_tools: false,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn with_tools(mut self, use_tools: bool) -> Self {
        self.use_tools = use_tools;
        self
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
