//! Worker activity log.
//!
//! The main chat window stays clean; background-agent activity goes to
//! a dedicated file which `arc workers --follow` tails. Line format:
//!
//! ```text
//! 14:30:15 | research_ai   | SPAWNED    | research_ai_news
//! 14:30:16 | research_ai   | THINKING   | iter=1
//! 14:30:17 | research_ai   | TOOL CALL  | web_search(query="AI news…")
//! 14:30:18 | research_ai   | TOOL DONE  | ✓ Found 10 results about…
//! 14:30:22 | research_ai   | COMPLETE   | ✓
//! ```
//!
//! The file is rotated on open (previous run kept as `.prev.log`) and
//! written line-buffered.

use std::{
    io::{LineWriter, Write},
    path::PathBuf,
    sync::Mutex,
};

use serde_json::Value;

use crate::core::{event_type, Event};

// Column widths for alignment.
const W_WORKER: usize = 14;
const W_EVENT: usize = 10;

pub struct WorkerActivityLog {
    path: PathBuf,
    file: Mutex<Option<LineWriter<std::fs::File>>>,
}

impl WorkerActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Open the log file, rotating any previous log to `.prev.log`.
    pub fn open(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            let prev = self.path.with_extension("prev.log");
            let _ = std::fs::rename(&self.path, prev);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = LineWriter::new(file);
        write_separator(&mut writer, "session start");
        *self.file.lock().unwrap_or_else(|e| e.into_inner()) = Some(writer);
        Ok(())
    }

    pub fn close(&self) {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            write_separator(writer, "session end");
        }
        *guard = None;
    }

    // ── Event handler — wire to bus.on("*") ──────────────────────────────────

    /// Format and append one line per background-agent event. Events
    /// from the main agent are ignored.
    pub fn handle(&self, event: &Event) {
        if !is_background_source(&event.source) {
            return;
        }

        let (column, detail) = match event.event_type.as_str() {
            event_type::AGENT_SPAWNED => {
                let name = event
                    .data_str("task_name")
                    .or_else(|| event.data_str("task_id"))
                    .unwrap_or("");
                ("SPAWNED", name.to_string())
            }
            event_type::AGENT_THINKING => {
                let iteration = event.data.get("iteration").and_then(Value::as_u64).unwrap_or(0);
                ("THINKING", format!("iter={iteration}"))
            }
            event_type::SKILL_TOOL_CALL => {
                let tool = event.data_str("tool").unwrap_or("?");
                ("TOOL CALL", format!("{tool}({})", format_args_preview(event)))
            }
            event_type::SKILL_TOOL_RESULT => {
                let success = event.data.get("success").and_then(Value::as_bool).unwrap_or(false);
                let preview = event.data_str("output_preview").unwrap_or("");
                let icon = if success { "✓" } else { "✗" };
                let detail = if preview.is_empty() {
                    "done".to_string()
                } else {
                    truncate(&preview.replace('\n', " "), 60)
                };
                ("TOOL DONE", format!("{icon} {detail}"))
            }
            event_type::AGENT_TASK_COMPLETE => {
                let success = event.data.get("success").and_then(Value::as_bool).unwrap_or(true);
                ("COMPLETE", if success { "✓" } else { "✗" }.to_string())
            }
            event_type::AGENT_ERROR => {
                let error = event.data_str("error").unwrap_or("unknown error");
                ("ERROR", truncate(error, 60))
            }
            _ => return,
        };

        let ts = chrono::Local::now().format("%H:%M:%S");
        let label = worker_label(&event.source);
        let line = format!("{ts} | {label} | {column:<W_EVENT$} | {detail}\n");

        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writer.write_all(line.as_bytes()) {
                log::warn!("worker activity log write failed: {e}");
            }
        }
    }
}

/// Workers and scheduler sub-agents both land here; the main agent and
/// plain component sources do not.
fn is_background_source(source: &str) -> bool {
    source.starts_with("worker:") || source.starts_with("scheduler:")
}

/// `"worker:research_ai_news"` → `"research_ai_n "` (fixed width).
fn worker_label(source: &str) -> String {
    let label = source
        .strip_prefix("worker:")
        .or_else(|| source.strip_prefix("scheduler:"))
        .unwrap_or(source);
    let truncated: String = label.chars().take(W_WORKER).collect();
    format!("{truncated:<W_WORKER$}")
}

fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n {
        out.push('…');
    }
    out
}

/// First two arguments, values truncated, as `k="v"` pairs.
fn format_args_preview(event: &Event) -> String {
    event
        .data
        .get("arguments")
        .and_then(Value::as_object)
        .map(|args| {
            args.iter()
                .take(2)
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("{k}=\"{}\"", truncate(&value, 30))
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn write_separator(writer: &mut LineWriter<std::fs::File>, label: &str) {
    let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let rule = "─".repeat(72);
    let _ = writeln!(writer, "{rule}");
    let _ = writeln!(writer, "  {ts}  —  {label}");
    let _ = writeln!(writer, "{rule}");
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, source: &str, data: Value) -> Event {
        Event::new(event_type, source).with_data(data)
    }

    fn log_in(dir: &tempfile::TempDir) -> WorkerActivityLog {
        let log = WorkerActivityLog::new(dir.path().join("worker_activity.log"));
        log.open().unwrap();
        log
    }

    #[test]
    fn worker_events_are_formatted_in_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = log_in(&dir);

        log.handle(&event(
            event_type::AGENT_SPAWNED,
            "worker:research_ai",
            json!({"task_id": "research_ai_a1b2", "task_name": "research_ai"}),
        ));
        log.handle(&event(
            event_type::AGENT_THINKING,
            "worker:research_ai",
            json!({"iteration": 2}),
        ));
        log.handle(&event(
            event_type::SKILL_TOOL_CALL,
            "worker:research_ai",
            json!({"tool": "web_search", "arguments": {"query": "AI news today"}}),
        ));
        log.handle(&event(
            event_type::SKILL_TOOL_RESULT,
            "worker:research_ai",
            json!({"tool": "web_search", "success": true, "output_preview": "Found 10 results"}),
        ));
        log.handle(&event(
            event_type::AGENT_TASK_COMPLETE,
            "worker:research_ai",
            json!({"success": true}),
        ));
        log.close();

        let content = std::fs::read_to_string(dir.path().join("worker_activity.log")).unwrap();
        assert!(content.contains("| SPAWNED    | research_ai"));
        assert!(content.contains("| THINKING   | iter=2"));
        assert!(content.contains("TOOL CALL  | web_search(query=\"AI news today\")"));
        assert!(content.contains("TOOL DONE  | ✓ Found 10 results"));
        assert!(content.contains("| COMPLETE   | ✓"));
    }

    #[test]
    fn main_agent_events_are_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = log_in(&dir);
        log.handle(&event(event_type::AGENT_THINKING, "main", json!({"iteration": 1})));
        log.close();

        let content = std::fs::read_to_string(dir.path().join("worker_activity.log")).unwrap();
        assert!(!content.contains("THINKING"));
    }

    #[test]
    fn scheduler_sources_are_logged() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = log_in(&dir);
        log.handle(&event(
            event_type::AGENT_TASK_COMPLETE,
            "scheduler:morning_news",
            json!({"success": false}),
        ));
        log.close();

        let content = std::fs::read_to_string(dir.path().join("worker_activity.log")).unwrap();
        assert!(content.contains("morning_news"));
        assert!(content.contains("✗"));
    }

    #[test]
    fn open_rotates_previous_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("worker_activity.log");
        std::fs::write(&path, "old run\n").unwrap();

        let log = WorkerActivityLog::new(path.clone());
        log.open().unwrap();
        log.close();

        let prev = std::fs::read_to_string(dir.path().join("worker_activity.prev.log")).unwrap();
        assert!(prev.contains("old run"));
    }

    #[test]
    fn labels_are_fixed_width() {
        assert_eq!(worker_label("worker:ab").len(), W_WORKER);
        let long = worker_label("worker:research_ai_news_extra");
        assert_eq!(long.chars().count(), W_WORKER);
    }
}
