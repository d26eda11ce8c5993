//! Event logging middleware.
//!
//! Logs every event at debug level and, when given a log directory,
//! appends one JSON line per event to `events_YYYYMMDD.jsonl`.

use std::{
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use crate::core::{Event, Middleware, Next};

pub struct EventLogMiddleware {
    /// `None` disables the JSONL file; debug logging still happens.
    log_dir: Option<PathBuf>,
    file: Mutex<Option<(String, std::fs::File)>>,
}

impl EventLogMiddleware {
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self {
            log_dir,
            file: Mutex::new(None),
        }
    }

    fn append_jsonl(&self, event: &Event) {
        let Some(dir) = &self.log_dir else {
            return;
        };
        let day = chrono::Local::now().format("%Y%m%d").to_string();
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };

        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        // Roll the file when the date changes.
        let needs_open = !matches!(&*guard, Some((open_day, _)) if *open_day == day);
        if needs_open {
            if std::fs::create_dir_all(dir).is_err() {
                return;
            }
            let path = dir.join(format!("events_{day}.jsonl"));
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => *guard = Some((day, file)),
                Err(e) => {
                    log::warn!("event log open failed: {e}");
                    return;
                }
            }
        }
        if let Some((_, file)) = guard.as_mut() {
            let _ = writeln!(file, "{line}");
        }
    }
}

#[async_trait::async_trait]
impl Middleware for EventLogMiddleware {
    async fn handle(&self, event: Event, next: Next<'_>) -> Event {
        log::debug!(
            "[{}] source={} data_keys={:?}",
            event.event_type,
            event.source,
            event.data.keys().collect::<Vec<_>>()
        );
        self.append_jsonl(&event);
        next.run(event).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
