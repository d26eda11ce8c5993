//! Telegram channel — delivers notifications via a bot.
//!
//! Requires `[telegram]` config with both `token` and `chat_id`; with
//! either missing the channel stays inactive. To find your chat id,
//! message your bot once and read `chat.id` from
//! `https://api.telegram.org/bot<TOKEN>/getUpdates`.

use async_trait::async_trait;
use serde_json::json;

use crate::core::ArcError;

use super::super::base::{Notification, NotificationChannel};

pub struct TelegramChannel {
    token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self::with_api_base(token, chat_id, "https://api.telegram.org")
    }

    /// Override the API host (tests point this at a local stub).
    pub fn with_api_base(token: &str, chat_id: &str, api_base: &str) -> Self {
        Self {
            token: token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    fn payload(&self, notification: &Notification) -> serde_json::Value {
        json!({
            "chat_id": self.chat_id,
            "text": format!("⏰ *{}*\n\n{}", notification.job_name, notification.content),
            "parse_mode": "Markdown",
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn is_active(&self) -> bool {
        !self.token.is_empty() && !self.chat_id.is_empty()
    }

    fn is_external(&self) -> bool {
        true
    }

    async fn deliver(&self, notification: &Notification) -> Result<bool, ArcError> {
        if !self.is_active() {
            return Ok(false);
        }

        let response = self
            .client
            .post(self.send_message_url())
            .timeout(std::time::Duration::from_secs(10))
            .json(&self.payload(notification))
            .send()
            .await
            .map_err(|e| ArcError::Platform(format!("Telegram delivery failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ArcError::Platform(format!(
                "Telegram API error ({status}): {body}"
            )));
        }
        log::debug!("telegram notification sent to {}", self.chat_id);
        Ok(true)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_channel_is_inactive() {
        assert!(!TelegramChannel::new("", "").is_active());
        assert!(!TelegramChannel::new("tok", "").is_active());
        assert!(TelegramChannel::new("tok", "42").is_active());
    }

    #[test]
    fn channel_is_external() {
        assert!(TelegramChannel::new("tok", "42").is_external());
    }

    #[test]
    fn payload_uses_markdown_alarm_format() {
        let channel = TelegramChannel::new("tok", "42");
        let payload = channel.payload(&Notification::new("j", "morning_news", "Top stories"));
        assert_eq!(payload["chat_id"], "42");
        assert_eq!(payload["parse_mode"], "Markdown");
        let text = payload["text"].as_str().unwrap_or("");
        assert!(text.starts_with("⏰ *morning_news*"));
        assert!(text.contains("Top stories"));
    }

    #[test]
    fn url_embeds_the_token() {
        let channel = TelegramChannel::with_api_base("abc123", "42", "http://localhost:9999/");
        assert_eq!(channel.send_message_url(), "http://localhost:9999/botabc123/sendMessage");
    }

    #[tokio::test]
    async fn inactive_deliver_is_a_noop() {
        let channel = TelegramChannel::new("", "");
        let delivered = channel
            .deliver(&Notification::new("j", "job", "c"))
            .await
            .unwrap();
        assert!(!delivered);
    }
}
