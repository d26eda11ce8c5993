//! Notification primitives.
//!
//! Every delivery target (CLI pending queue, Telegram, file log)
//! implements [`NotificationChannel`]; the router decides which ones
//! fire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ArcError;

/// A single proactive message produced by a background job or worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub job_id: String,
    pub job_name: String,
    pub content: String,
    /// Unix timestamp.
    pub fired_at: i64,
}

impl Notification {
    pub fn new(job_id: &str, job_name: &str, content: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            content: content.to_string(),
            fired_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Abstract delivery target.
///
/// The router consults `is_active` first; inactive channels are
/// skipped entirely. `deliver` returns `true` when the message was
/// actually sent.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short identifier: `"cli"`, `"telegram"`, `"file"`.
    fn name(&self) -> &str;

    /// Whether this channel can currently receive notifications.
    fn is_active(&self) -> bool;

    /// External platforms (Telegram, …) take routing priority over the
    /// local CLI.
    fn is_external(&self) -> bool {
        false
    }

    async fn deliver(&self, notification: &Notification) -> Result<bool, ArcError>;
}
