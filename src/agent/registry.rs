//! Agent registry — lifecycle tracking for experts and workers.
//!
//! Experts are long-lived named sub-agents, each bound to a
//! [`VirtualPlatform`]; workers are ephemeral one-shot tasks. The
//! registry owns every background task handle so shutdown is
//! deterministic — no detached tasks.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::platforms::VirtualPlatform;

/// A running expert agent bound to a virtual platform.
pub struct ExpertEntry {
    pub name: String,
    pub platform: Arc<VirtualPlatform>,
    pub task: JoinHandle<()>,
    pub specialty: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct AgentRegistry {
    experts: Mutex<HashMap<String, ExpertEntry>>,
    workers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl AgentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ── Expert management ────────────────────────────────────────────────────

    /// Register a running expert. Replaces any previous entry of the
    /// same name (the caller is responsible for stopping the old one).
    pub fn register_expert(
        &self,
        name: &str,
        platform: Arc<VirtualPlatform>,
        task: JoinHandle<()>,
        specialty: &str,
    ) {
        let mut experts = self.experts.lock().unwrap_or_else(|e| e.into_inner());
        if experts.contains_key(name) {
            log::warn!("expert '{name}' already registered — replacing");
        }
        experts.insert(
            name.to_string(),
            ExpertEntry {
                name: name.to_string(),
                platform,
                task,
                specialty: specialty.to_string(),
                created_at: Utc::now(),
            },
        );
        log::info!("expert '{name}' registered (specialty: {})", if specialty.is_empty() { "general" } else { specialty });
    }

    pub fn has_expert(&self, name: &str) -> bool {
        self.experts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn expert_names(&self) -> Vec<String> {
        let experts = self.experts.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = experts.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Route a message to a named expert. `None` if it does not exist.
    pub async fn send_to_expert(&self, name: &str, message: &str) -> Option<String> {
        let platform = {
            let experts = self.experts.lock().unwrap_or_else(|e| e.into_inner());
            experts.get(name).map(|e| Arc::clone(&e.platform))
        };
        match platform {
            Some(p) => p.send_message(message).await.ok(),
            None => None,
        }
    }

    /// Stop and remove a named expert. Returns whether it existed.
    pub async fn remove_expert(&self, name: &str) -> bool {
        let entry = self
            .experts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        match entry {
            Some(entry) => {
                stop_expert(entry).await;
                log::info!("expert '{name}' removed");
                true
            }
            None => false,
        }
    }

    // ── Worker task management ───────────────────────────────────────────────

    /// Spawn and track an ephemeral worker task. The entry removes
    /// itself from the map when the future completes; the gate ensures
    /// the task cannot finish before it has been registered.
    pub fn register_worker<F>(&self, task_id: &str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        let id = task_id.to_string();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let cleanup_id = id.clone();
        let cleanup_map = Arc::clone(&self.workers);
        let handle = tokio::spawn(async move {
            let _ = gate_rx.await;
            fut.await;
            cleanup_map
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&cleanup_id);
        });

        workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handle);
        let _ = gate_tx.send(());
        log::debug!("worker task '{task_id}' registered");
    }

    /// Ids of workers that are still running.
    pub fn list_worker_ids(&self) -> Vec<String> {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = workers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel one worker. Returns whether it existed.
    pub fn cancel_worker(&self, task_id: &str) -> bool {
        let handle = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    /// Cancel every worker and stop every expert. Safe to call more
    /// than once.
    pub async fn shutdown_all(&self) {
        let workers: Vec<(String, JoinHandle<()>)> = {
            let mut map = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().collect()
        };
        let experts: Vec<ExpertEntry> = {
            let mut map = self.experts.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().map(|(_, v)| v).collect()
        };

        log::info!(
            "agent registry shutting down — {} workers, {} experts",
            workers.len(),
            experts.len()
        );

        for (_, handle) in &workers {
            handle.abort();
        }
        // Join with error tolerance; aborted tasks resolve to JoinError.
        futures::future::join_all(workers.into_iter().map(|(_, h)| h)).await;

        for entry in experts {
            stop_expert(entry).await;
        }
        log::info!("agent registry shutdown complete");
    }
}

/// Stop one expert: platform first, then cancel with a bounded join.
async fn stop_expert(entry: ExpertEntry) {
    entry.platform.stop().await;
    let name = entry.name;
    let task = entry.task;
    if !task.is_finished() {
        task.abort();
        if tokio::time::timeout(Duration::from_secs(3), task).await.is_err() {
            log::debug!("expert '{name}' did not stop in time");
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
