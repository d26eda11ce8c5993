//! The long-term memory contract.
//!
//! The three-tier store, embeddings, and distillation pipeline live
//! outside this crate; the agent loop consumes only this trait. A
//! trivial in-memory implementation is provided for wiring and tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::types::Message;
use crate::core::ArcError;
use crate::llm::LlmProvider;

/// One unit of long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    /// `"fact"` (core tier) or `"episode"` (episodic tier).
    pub entry_type: String,
    pub source: String,
    pub timestamp: f64,
    #[serde(default)]
    pub relevance_score: f64,
}

/// Long-term memory as seen by the agent loop.
#[async_trait]
pub trait MemoryManager: Send + Sync {
    /// Relevant entries for a query. Core facts come back with
    /// `entry_type == "fact"`, episodic memories as `"episode"`.
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>, ArcError>;

    /// Persist one user/assistant exchange.
    async fn store_turn(&self, user: &str, assistant: &str, session_id: &str) -> Result<(), ArcError>;

    /// Whether enough has accumulated to be worth distilling.
    fn should_distill(&self) -> bool;

    /// Condense recent messages into core facts. Fire-and-forget from
    /// the loop's perspective.
    async fn distill(&self, messages: &[Message], llm: Arc<dyn LlmProvider>) -> Result<(), ArcError>;

    /// Episodic entries, newest first (backs the `/memory` command).
    async fn list_episodic(&self, limit: usize) -> Result<Vec<MemoryEntry>, ArcError>;

    /// Delete an entry by id. Returns whether it existed.
    async fn forget(&self, id: &str) -> Result<bool, ArcError>;

    /// Flush and release the backing store. Called once from the
    /// shutdown cascade; in-memory implementations have nothing to do.
    async fn close(&self) -> Result<(), ArcError> {
        Ok(())
    }
}

// ─── InMemoryManager ─────────────────────────────────────────────────────────

/// Substring-matching in-memory implementation for wiring and tests.
pub struct InMemoryManager {
    entries: Mutex<Vec<MemoryEntry>>,
    distill_after: usize,
    stored_turns: Mutex<usize>,
}

impl InMemoryManager {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            distill_after: usize::MAX,
            stored_turns: Mutex::new(0),
        }
    }

    pub fn insert_fact(&self, content: &str) {
        self.insert("fact", content);
    }

    pub fn insert_episode(&self, content: &str) {
        self.insert("episode", content);
    }

    fn insert(&self, entry_type: &str, content: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(MemoryEntry {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            content: content.to_string(),
            entry_type: entry_type.to_string(),
            source: "test".to_string(),
            timestamp: 0.0,
            relevance_score: 0.0,
        });
    }
}

impl Default for InMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryManager for InMemoryManager {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>, ArcError> {
        let needle = query.to_ascii_lowercase();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|e| {
                e.entry_type == "fact" || e.content.to_ascii_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn store_turn(&self, user: &str, assistant: &str, _session_id: &str) -> Result<(), ArcError> {
        self.insert_episode(&format!("User: {user}\nAssistant: {assistant}"));
        *self.stored_turns.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn should_distill(&self) -> bool {
        *self.stored_turns.lock().unwrap_or_else(|e| e.into_inner()) >= self.distill_after
    }

    async fn distill(&self, _messages: &[Message], _llm: Arc<dyn LlmProvider>) -> Result<(), ArcError> {
        Ok(())
    }

    async fn list_episodic(&self, limit: usize) -> Result<Vec<MemoryEntry>, ArcError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.entry_type == "episode")
            .take(limit)
            .cloned()
            .collect())
    }

    async fn forget(&self, id: &str) -> Result<bool, ArcError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrieve_returns_facts_and_matching_episodes() {
        let m = InMemoryManager::new();
        m.insert_fact("user likes tea");
        m.insert_episode("talked about rust traits");
        m.insert_episode("talked about gardening");

        let hits = m.retrieve("rust", 10).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|e| e.content.as_str()).collect();
        assert!(contents.contains(&"user likes tea"));
        assert!(contents.contains(&"talked about rust traits"));
        assert!(!contents.contains(&"talked about gardening"));
    }

    #[tokio::test]
    async fn store_turn_creates_an_episode() {
        let m = InMemoryManager::new();
        m.store_turn("hello", "hi there", "s1").await.unwrap();
        let episodic = m.list_episodic(10).await.unwrap();
        assert_eq!(episodic.len(), 1);
        assert!(episodic[0].content.contains("hello"));
    }

    #[tokio::test]
    async fn forget_removes_by_id() {
        let m = InMemoryManager::new();
        m.insert_episode("to be removed");
        let id = m.list_episodic(1).await.unwrap()[0].id.clone();
        assert!(m.forget(&id).await.unwrap());
        assert!(!m.forget(&id).await.unwrap());
        assert!(m.list_episodic(10).await.unwrap().is_empty());
    }
}
