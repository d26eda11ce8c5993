//! File channel — always-on append log.
//!
//! Registered last, always active; every notification is persisted
//! even when no interactive platform is running. Entry format:
//!
//! ```text
//! [2026-03-01 09:00:00] [morning_news]
//! <content>
//! ────────────────────────────────────────
//! ```

use std::{io::Write, path::PathBuf};

use async_trait::async_trait;
use chrono::TimeZone;

use crate::core::ArcError;

use super::super::base::{Notification, NotificationChannel};

pub struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl NotificationChannel for FileChannel {
    fn name(&self) -> &str {
        "file"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn deliver(&self, notification: &Notification) -> Result<bool, ArcError> {
        let ts = chrono::Local
            .timestamp_opt(notification.fired_at, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| notification.fired_at.to_string());
        let entry = format!(
            "[{ts}] [{}]\n{}\n{}\n",
            notification.job_name,
            notification.content,
            "─".repeat(60)
        );

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, ArcError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(entry.as_bytes())?;
            Ok(true)
        })
        .await
        .map_err(|e| ArcError::Storage(e.to_string()))?
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_formatted_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let channel = FileChannel::new(dir.path().join("notifications.log"));

        channel
            .deliver(&Notification::new("j1", "morning_news", "Top stories today"))
            .await
            .unwrap();
        channel
            .deliver(&Notification::new("j2", "reminder", "Stand up"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(channel.path()).unwrap();
        assert!(content.contains("[morning_news]"));
        assert!(content.contains("Top stories today"));
        assert!(content.contains("[reminder]"));
        assert_eq!(content.matches("──────").count(), 2);
    }

    #[tokio::test]
    async fn creates_missing_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let channel = FileChannel::new(dir.path().join("nested/logs/notifications.log"));
        let ok = channel
            .deliver(&Notification::new("j", "job", "content"))
            .await
            .unwrap();
        assert!(ok);
        assert!(channel.path().exists());
    }
}
