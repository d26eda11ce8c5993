//! Notification router — which channels receive each notification.
//!
//! Routing rules:
//! 1. Try all active **external** channels. If at least one delivers,
//!    interactive delivery is done.
//! 2. Otherwise deliver to active non-external, non-file channels
//!    (the CLI pending queue).
//! 3. Always append to file channels — the permanent record.
//!
//! So: Telegram configured + CLI open → Telegram only; only CLI open →
//! CLI; nothing active → file log only. A channel that errors is
//! logged and skipped; routing never aborts.

use std::sync::{Arc, RwLock};

use super::base::{Notification, NotificationChannel};

#[derive(Default)]
pub struct NotificationRouter {
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Registration order does not affect routing.
    pub fn register(&self, channel: Arc<dyn NotificationChannel>) {
        log::debug!("notification channel registered: {}", channel.name());
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(channel);
    }

    pub fn unregister(&self, name: &str) {
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|c| c.name() != name);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Deliver according to the priority rules. Never errors.
    pub async fn route(&self, notification: &Notification) {
        let channels: Vec<Arc<dyn NotificationChannel>> = self
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let external: Vec<_> = channels.iter().filter(|c| c.is_external()).collect();
        let cli: Vec<_> = channels
            .iter()
            .filter(|c| !c.is_external() && c.name() != "file")
            .collect();
        let file: Vec<_> = channels.iter().filter(|c| c.name() == "file").collect();

        let mut external_delivered = false;
        for channel in external {
            if !channel.is_active() {
                continue;
            }
            match channel.deliver(notification).await {
                Ok(true) => {
                    external_delivered = true;
                    log::debug!("notification delivered via {}", channel.name());
                }
                Ok(false) => {}
                Err(e) => log::warn!("channel {} delivery failed: {e}", channel.name()),
            }
        }

        if !external_delivered {
            for channel in cli {
                if !channel.is_active() {
                    continue;
                }
                if let Err(e) = channel.deliver(notification).await {
                    log::warn!("channel {} delivery failed: {e}", channel.name());
                }
            }
        }

        for channel in file {
            if let Err(e) = channel.deliver(notification).await {
                log::warn!("file channel delivery failed: {e}");
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArcError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Probe {
        name: &'static str,
        external: bool,
        active: AtomicBool,
        succeed: bool,
        deliveries: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str, external: bool, active: bool, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                external,
                active: AtomicBool::new(active),
                succeed,
                deliveries: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.deliveries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for Probe {
        fn name(&self) -> &str {
            self.name
        }
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
        fn is_external(&self) -> bool {
            self.external
        }
        async fn deliver(&self, _n: &Notification) -> Result<bool, ArcError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(self.succeed)
        }
    }

    fn note() -> Notification {
        Notification::new("job1", "morning", "content")
    }

    #[tokio::test]
    async fn external_delivery_suppresses_cli() {
        let router = NotificationRouter::new();
        let telegram = Probe::new("telegram", true, true, true);
        let cli = Probe::new("cli", false, true, true);
        let file = Probe::new("file", false, true, true);
        router.register(Arc::clone(&telegram) as _);
        router.register(Arc::clone(&cli) as _);
        router.register(Arc::clone(&file) as _);

        router.route(&note()).await;
        assert_eq!(telegram.count(), 1);
        assert_eq!(cli.count(), 0);
        // File always delivers exactly once.
        assert_eq!(file.count(), 1);
    }

    #[tokio::test]
    async fn cli_receives_when_no_external_delivers() {
        let router = NotificationRouter::new();
        let telegram = Probe::new("telegram", true, true, false); // deliver() = false
        let cli = Probe::new("cli", false, true, true);
        let file = Probe::new("file", false, true, true);
        router.register(Arc::clone(&telegram) as _);
        router.register(Arc::clone(&cli) as _);
        router.register(Arc::clone(&file) as _);

        router.route(&note()).await;
        assert_eq!(cli.count(), 1);
        assert_eq!(file.count(), 1);
    }

    #[tokio::test]
    async fn inactive_channels_are_skipped() {
        let router = NotificationRouter::new();
        let telegram = Probe::new("telegram", true, false, true);
        let cli = Probe::new("cli", false, false, true);
        let file = Probe::new("file", false, true, true);
        router.register(Arc::clone(&telegram) as _);
        router.register(Arc::clone(&cli) as _);
        router.register(Arc::clone(&file) as _);

        router.route(&note()).await;
        assert_eq!(telegram.count(), 0);
        assert_eq!(cli.count(), 0);
        assert_eq!(file.count(), 1);
    }

    struct Exploding;

    #[async_trait]
    impl NotificationChannel for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }
        fn is_active(&self) -> bool {
            true
        }
        fn is_external(&self) -> bool {
            true
        }
        async fn deliver(&self, _n: &Notification) -> Result<bool, ArcError> {
            Err(ArcError::Platform("boom".into()))
        }
    }

    #[tokio::test]
    async fn channel_error_does_not_abort_routing() {
        let router = NotificationRouter::new();
        let cli = Probe::new("cli", false, true, true);
        let file = Probe::new("file", false, true, true);
        router.register(Arc::new(Exploding));
        router.register(Arc::clone(&cli) as _);
        router.register(Arc::clone(&file) as _);

        router.route(&note()).await;
        // The exploding external did not deliver, so CLI gets it.
        assert_eq!(cli.count(), 1);
        assert_eq!(file.count(), 1);
    }

    #[tokio::test]
    async fn unregister_removes_channel() {
        let router = NotificationRouter::new();
        let cli = Probe::new("cli", false, true, true);
        router.register(Arc::clone(&cli) as _);
        assert_eq!(router.channel_names(), vec!["cli"]);
        router.unregister("cli");
        assert!(router.channel_names().is_empty());
    }
}
