//! The kernel — composition root and lifecycle owner.
//!
//! Holds the event bus, the provider registry, the loaded config, and
//! the set of tracked background tasks. Intentionally small; all
//! intelligence lives in the subsystems.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::task::JoinSet;

use crate::config::ArcConfig;

use super::bus::{EventBus, Middleware, SubscriptionId};
use super::events::{event_type, Event};
use super::registry::Registry;

pub struct Kernel {
    pub config: ArcConfig,
    pub bus: Arc<EventBus>,
    pub registry: Registry,
    running: AtomicBool,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl Kernel {
    pub fn new(config: ArcConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus: Arc::new(EventBus::new()),
            registry: Registry::new(),
            running: AtomicBool::new(false),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        })
    }

    // ── Event bus shortcuts ──────────────────────────────────────────────────

    pub async fn emit(&self, event: Event) -> Event {
        self.bus.emit(event).await
    }

    pub fn emit_nowait(&self, event: Event) {
        Arc::clone(&self.bus).emit_nowait(event);
    }

    pub fn on<F, Fut>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), super::errors::ArcError>> + Send + 'static,
    {
        self.bus.on(pattern, handler)
    }

    pub fn use_middleware(&self, mw: Arc<dyn Middleware>) {
        self.bus.use_middleware(mw);
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Start the kernel. Emits `system:start`. Double start is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("kernel starting");
        self.bus.emit(Event::new(event_type::SYSTEM_START, "kernel")).await;
    }

    /// Stop the kernel: cancel tracked tasks, await them with error
    /// tolerance, emit `system:stop`. Double stop is a no-op.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        log::info!("kernel stopping");
        {
            let mut tasks = self.tasks.lock().await;
            tasks.shutdown().await;
        }
        self.bus.emit(Event::new(event_type::SYSTEM_STOP, "kernel")).await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn a background task tracked by the kernel. Tracked tasks are
    /// cancelled and awaited by [`Kernel::stop`]; completed tasks are
    /// reaped on the next spawn.
    pub async fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        // Reap anything already finished so the set doesn't grow unboundedly.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
    }

    /// Number of live tracked tasks.
    pub async fn tracked_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn kernel() -> Arc<Kernel> {
        Kernel::new(ArcConfig::default())
    }

    #[tokio::test]
    async fn double_start_emits_one_system_start() {
        let k = kernel();
        let starts = Arc::new(AtomicUsize::new(0));
        let starts_h = Arc::clone(&starts);
        k.on(event_type::SYSTEM_START, move |_| {
            let s = Arc::clone(&starts_h);
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        k.start().await;
        k.start().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(k.is_running());
    }

    #[tokio::test]
    async fn stop_cancels_tracked_tasks() {
        let k = kernel();
        k.start().await;
        k.spawn(async {
            // Runs forever unless cancelled.
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        })
        .await;
        assert_eq!(k.tracked_tasks().await, 1);

        k.stop().await;
        assert_eq!(k.tracked_tasks().await, 0);
        assert!(!k.is_running());
    }

    #[tokio::test]
    async fn double_stop_is_a_no_op() {
        let k = kernel();
        let stops = Arc::new(AtomicUsize::new(0));
        let stops_h = Arc::clone(&stops);
        k.on(event_type::SYSTEM_STOP, move |_| {
            let s = Arc::clone(&stops_h);
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        k.start().await;
        k.stop().await;
        k.stop().await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
