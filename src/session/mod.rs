//! Conversation state, keyed by caller-supplied thread id.
//!
//! The store owns all per-thread mutable state. History is only mutated
//! through a [`SessionGuard`], which holds the thread's lock for as long as
//! it lives, so mutation without the lock does not compile.

mod error;
mod persist;

pub use error::{Result, SessionError};
pub use persist::{FileBackend, SessionBackend, list_saved};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::{Role, Turn, Usage};
use crate::sync::{ThreadGuard, ThreadLocks};

// ============================================================================
// Conversation State
// ============================================================================

/// One conversation: an append-only turn history plus activity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Usage reported for the most recent exchange, when retention is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_usage: Option<Usage>,
    /// Cumulative usage across the conversation, when retention is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_usage: Option<Usage>,
}

impl ConversationState {
    #[must_use]
    pub fn new(thread_id: String) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            turns: Vec::new(),
            created_at: now,
            last_activity: now,
            last_usage: None,
            total_usage: None,
        }
    }
}

/// Lightweight per-thread metadata for list responses.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

// ============================================================================
// Session Store
// ============================================================================

/// In-memory conversation store with per-thread locking and optional
/// durable backing. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    threads: Arc<DashMap<String, ConversationState>>,
    locks: ThreadLocks,
    backend: Option<Arc<dyn SessionBackend>>,
}

impl SessionStore {
    /// Create a volatile store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            threads: Arc::new(DashMap::new()),
            locks: ThreadLocks::new(),
            backend: None,
        }
    }

    /// Create a store that loads and saves state through `backend`.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            threads: Arc::new(DashMap::new()),
            locks: ThreadLocks::new(),
            backend: Some(backend),
        }
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Return the thread's state, creating an empty one on first use.
    ///
    /// Concurrent callers with the same id observe a single created
    /// instance. When a backend is configured, a miss first consults it.
    pub async fn get_or_create(&self, thread_id: &str) -> Result<ConversationState> {
        if let Some(existing) = self.threads.get(thread_id) {
            return Ok(existing.value().clone());
        }

        let loaded = match &self.backend {
            Some(backend) => backend.load(thread_id).await?,
            None => None,
        };
        if loaded.is_some() {
            debug!(thread_id, "Loaded conversation from backend");
        }

        let entry = self
            .threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                loaded.unwrap_or_else(|| ConversationState::new(thread_id.to_string()))
            });
        Ok(entry.value().clone())
    }

    /// Acquire exclusive access to a thread, FIFO behind earlier callers.
    pub async fn lock(&self, thread_id: &str) -> SessionGuard<'_> {
        let lock = self.locks.acquire(thread_id).await;
        SessionGuard {
            store: self,
            thread_id: thread_id.to_string(),
            _lock: lock,
        }
    }

    /// Copy-on-read view of a thread's history.
    #[must_use]
    pub fn snapshot(&self, thread_id: &str) -> Option<Vec<Turn>> {
        self.threads.get(thread_id).map(|s| s.turns.clone())
    }

    /// Copy of a thread's full state.
    #[must_use]
    pub fn get(&self, thread_id: &str) -> Option<ConversationState> {
        self.threads.get(thread_id).map(|s| s.value().clone())
    }

    /// Summaries for all known threads.
    #[must_use]
    pub fn list(&self) -> Vec<ThreadSummary> {
        let mut summaries: Vec<_> = self
            .threads
            .iter()
            .map(|entry| {
                let state = entry.value();
                ThreadSummary {
                    thread_id: state.thread_id.clone(),
                    turns: state.turns.len(),
                    created_at: state.created_at,
                    last_activity: state.last_activity,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.thread_id.cmp(&b.thread_id));
        summaries
    }

    /// Remove a thread and its durable copy, waiting out any in-flight call.
    ///
    /// Returns true if the thread existed.
    pub async fn remove(&self, thread_id: &str) -> Result<bool> {
        let guard = self.lock(thread_id).await;
        let existed = self.threads.remove(thread_id).is_some();

        if let Some(backend) = &self.backend {
            backend.delete(thread_id).await?;
        }

        drop(guard);
        self.locks.release_entry(thread_id);
        Ok(existed)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    // ------------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------------

    /// Evict threads with no activity for at least `max_idle`.
    ///
    /// Each candidate's lock is taken with `try_acquire`, so a thread with a
    /// call in flight is skipped rather than evicted mid-call. Durable
    /// copies are kept: an evicted thread reloads from the backend on next
    /// use. Returns the number of threads evicted.
    pub async fn evict_idle(&self, max_idle: chrono::Duration) -> usize {
        let now = Utc::now();

        let candidates: Vec<String> = self
            .threads
            .iter()
            .filter(|entry| now - entry.value().last_activity >= max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for thread_id in candidates {
            let Some(lock) = self.locks.try_acquire(&thread_id) else {
                debug!(thread_id, "Skipping eviction, call in flight");
                continue;
            };

            // Re-check under the lock; the thread may have seen activity
            // between the scan and acquisition.
            let still_idle = self
                .threads
                .get(&thread_id)
                .is_some_and(|s| now - s.last_activity >= max_idle);

            if still_idle {
                self.threads.remove(&thread_id);
                evicted += 1;
                debug!(thread_id, "Evicted idle conversation");
            }

            drop(lock);
            if still_idle {
                self.locks.release_entry(&thread_id);
            }
        }

        if evicted > 0 {
            info!(evicted, remaining = self.len(), "Idle eviction sweep complete");
        }
        evicted
    }

    /// Spawn a background task sweeping idle threads and stale lock entries.
    ///
    /// The task runs indefinitely until the runtime shuts down.
    pub fn spawn_sweep_task(self, interval: Duration, max_idle: chrono::Duration) {
        let lock_max_age = max_idle
            .to_std()
            .unwrap_or(crate::sync::DEFAULT_MAX_IDLE_AGE);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval's first tick fires immediately; nothing is idle yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_idle(max_idle).await;
                self.locks.cleanup_stale(lock_max_age);
            }
        });
    }

    #[cfg(test)]
    fn backdate(&self, thread_id: &str, last_activity: DateTime<Utc>) {
        if let Some(mut state) = self.threads.get_mut(thread_id) {
            state.last_activity = last_activity;
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Session Guard
// ============================================================================

/// Exclusive access to one thread's conversation.
///
/// All history mutation goes through this guard; the thread's lock is held
/// until the guard drops, on every exit path.
pub struct SessionGuard<'a> {
    store: &'a SessionStore,
    thread_id: String,
    _lock: ThreadGuard,
}

impl SessionGuard<'_> {
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Number of turns currently in the history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store
            .threads
            .get(&self.thread_id)
            .map_or(0, |s| s.turns.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the history as it stands under this lock.
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.store
            .threads
            .get(&self.thread_id)
            .map_or_else(Vec::new, |s| s.turns.clone())
    }

    /// Append a turn and refresh the activity timestamp.
    ///
    /// Rejects an assistant turn directly following another assistant turn;
    /// that ordering indicates a caller bug and is never silently fixed.
    pub fn append(&self, turn: Turn) -> Result<()> {
        let mut state = self
            .store
            .threads
            .get_mut(&self.thread_id)
            .ok_or_else(|| SessionError::NotFound(self.thread_id.clone()))?;

        if turn.role == Role::Assistant
            && state.turns.last().map(|t| t.role) == Some(Role::Assistant)
        {
            return Err(SessionError::TurnOrder {
                thread_id: self.thread_id.clone(),
            });
        }

        state.turns.push(turn);
        state.last_activity = Utc::now();
        Ok(())
    }

    /// Roll the history back to `len` turns.
    ///
    /// Used to unstage turns from a call that did not complete; history must
    /// only ever contain turns from confirmed-successful exchanges.
    pub fn truncate(&self, len: usize) {
        if let Some(mut state) = self.store.threads.get_mut(&self.thread_id) {
            state.turns.truncate(len);
        }
    }

    /// Record provider usage for the exchange that just completed.
    pub fn record_usage(&self, usage: Usage) {
        if let Some(mut state) = self.store.threads.get_mut(&self.thread_id) {
            state.last_usage = Some(usage);
            state.total_usage =
                Some(state.total_usage.unwrap_or_default().accumulate(usage));
        }
    }

    /// Save the thread through the backend, if one is configured.
    pub async fn persist(&self) -> Result<()> {
        let Some(backend) = &self.store.backend else {
            return Ok(());
        };
        let Some(state) = self.store.get(&self.thread_id) else {
            return Ok(());
        };
        backend.save(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn get_or_create_returns_empty_state_once() {
        let store = SessionStore::new();

        let state = store.get_or_create("t1").await.unwrap();
        assert_eq!(state.thread_id, "t1");
        assert!(state.turns.is_empty());

        let again = store.get_or_create("t1").await.unwrap();
        assert_eq!(again.created_at, state.created_at);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_observes_one_instance() {
        let store = SessionStore::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.get_or_create("t1").await },
            ));
        }

        let mut created_ats = Vec::new();
        for handle in handles {
            created_ats.push(handle.await.unwrap().unwrap().created_at);
        }

        assert_eq!(store.len(), 1);
        assert!(created_ats.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn append_under_guard_updates_history() {
        let store = SessionStore::new();
        store.get_or_create("t1").await.unwrap();

        let guard = store.lock("t1").await;
        guard.append(Turn::user("Hello")).unwrap();
        guard.append(Turn::assistant("Hi")).unwrap();
        drop(guard);

        let turns = store.snapshot("t1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "Hello");
        assert_eq!(turns[1].content, "Hi");
    }

    #[tokio::test]
    async fn append_to_unknown_thread_fails_loudly() {
        let store = SessionStore::new();
        let guard = store.lock("ghost").await;

        let result = guard.append(Turn::user("hi"));
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn consecutive_assistant_turns_are_rejected() {
        let store = SessionStore::new();
        store.get_or_create("t1").await.unwrap();

        let guard = store.lock("t1").await;
        guard.append(Turn::user("q")).unwrap();
        guard.append(Turn::assistant("a")).unwrap();

        let result = guard.append(Turn::assistant("again"));
        assert!(matches!(result, Err(SessionError::TurnOrder { .. })));

        // History is untouched by the rejected append.
        assert_eq!(guard.len(), 2);
    }

    #[tokio::test]
    async fn truncate_unstages_turns() {
        let store = SessionStore::new();
        store.get_or_create("t1").await.unwrap();

        let guard = store.lock("t1").await;
        let base = guard.len();
        guard.append(Turn::user("staged")).unwrap();
        guard.truncate(base);

        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let store = SessionStore::new();
        store.get_or_create("t1").await.unwrap();

        let guard = store.lock("t1").await;
        guard.append(Turn::user("one")).unwrap();

        let mut snap = store.snapshot("t1").unwrap();
        snap.push(Turn::user("tampered"));

        assert_eq!(guard.len(), 1);
    }

    #[tokio::test]
    async fn record_usage_accumulates() {
        let store = SessionStore::new();
        store.get_or_create("t1").await.unwrap();

        let guard = store.lock("t1").await;
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        guard.record_usage(usage);
        guard.record_usage(usage);
        drop(guard);

        let state = store.get("t1").unwrap();
        assert_eq!(state.last_usage.unwrap().total_tokens, 15);
        assert_eq!(state.total_usage.unwrap().total_tokens, 30);
    }

    #[tokio::test]
    async fn evict_idle_removes_only_stale_threads() {
        let store = SessionStore::new();
        store.get_or_create("old").await.unwrap();
        store.get_or_create("fresh").await.unwrap();

        store.backdate("old", Utc::now() - chrono::Duration::hours(2));

        let evicted = store.evict_idle(chrono::Duration::hours(1)).await;
        assert_eq!(evicted, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());

        // A fresh state appears on next use.
        let state = store.get_or_create("old").await.unwrap();
        assert!(state.turns.is_empty());
    }

    #[tokio::test]
    async fn evict_idle_skips_threads_with_a_call_in_flight() {
        let store = SessionStore::new();
        store.get_or_create("busy").await.unwrap();
        store.backdate("busy", Utc::now() - chrono::Duration::hours(2));

        let guard = store.lock("busy").await;
        let evicted = store.evict_idle(chrono::Duration::hours(1)).await;
        assert_eq!(evicted, 0);
        assert!(store.get("busy").is_some());
        drop(guard);

        let evicted = store.evict_idle(chrono::Duration::hours(1)).await;
        assert_eq!(evicted, 1);
    }

    #[tokio::test]
    async fn remove_deletes_memory_and_backend() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(FileBackend::new(tmp.path()));
        let store = SessionStore::with_backend(backend.clone());

        store.get_or_create("t1").await.unwrap();
        {
            let guard = store.lock("t1").await;
            guard.append(Turn::user("hi")).unwrap();
            guard.persist().await.unwrap();
        }

        assert!(store.remove("t1").await.unwrap());
        assert!(store.get("t1").is_none());
        assert!(backend.load("t1").await.unwrap().is_none());
        assert!(!store.remove("t1").await.unwrap());
    }

    #[tokio::test]
    async fn eviction_keeps_durable_copy_for_reload() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(FileBackend::new(tmp.path()));
        let store = SessionStore::with_backend(backend);

        store.get_or_create("t1").await.unwrap();
        {
            let guard = store.lock("t1").await;
            guard.append(Turn::user("remember me")).unwrap();
            guard.persist().await.unwrap();
        }

        store.backdate("t1", Utc::now() - chrono::Duration::hours(2));
        assert_eq!(store.evict_idle(chrono::Duration::hours(1)).await, 1);
        assert!(store.get("t1").is_none());

        // Reload round-trips through the backend.
        let state = store.get_or_create("t1").await.unwrap();
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].content, "remember me");
    }
}
