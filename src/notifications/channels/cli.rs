//! CLI channel — the pending queue.
//!
//! Background results are not printed directly (they would interleave
//! with a streaming response); they wait on a bounded FIFO that the
//! interactive platform drains either at the start of the next user
//! turn or, when idle, from its watcher task.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::core::ArcError;

use super::super::base::{Notification, NotificationChannel};

const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO of notifications awaiting the interactive session.
pub struct PendingQueue {
    items: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
        })
    }

    /// Append; when full, the oldest entry is dropped (the file log
    /// still has it).
    pub fn push(&self, notification: Notification) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(notification);
    }

    /// Remove and return everything, FIFO order.
    pub fn drain(&self) -> Vec<Notification> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The in-process channel feeding the pending queue. Active only while
/// the interactive session is running.
pub struct CliChannel {
    queue: Arc<PendingQueue>,
    active: AtomicBool,
}

impl CliChannel {
    pub fn new(queue: Arc<PendingQueue>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            active: AtomicBool::new(false),
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }
}

#[async_trait]
impl NotificationChannel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn deliver(&self, notification: &Notification) -> Result<bool, ArcError> {
        if !self.is_active() {
            return Ok(false);
        }
        self.queue.push(notification.clone());
        Ok(true)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
