//! Synchronization primitives for Parley.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Default max idle age before a lock entry is considered stale.
pub const DEFAULT_MAX_IDLE_AGE: Duration = Duration::from_secs(3600);

/// Internal storage: thread id to (lock, last access time).
type LockStorage = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// Exclusive access to one conversation thread.
///
/// Waiters on the same thread id are queued in FIFO order by tokio's async
/// mutex, so submissions are served in arrival order. Dropping the guard
/// releases the thread on every exit path.
pub struct ThreadGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Per-thread async mutual exclusion with automatic stale-entry cleanup.
///
/// Lock entries are created lazily on first use. Distinct thread ids never
/// contend; operations on the same id are serialized. Entries are reclaimed
/// once nobody references them and the thread has been idle past the max age.
#[derive(Clone)]
pub struct ThreadLocks {
    locks: Arc<LockStorage>,
}

impl ThreadLocks {
    /// Create a new empty lock collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Acquire exclusive access to the given thread, waiting FIFO behind any
    /// earlier submitters.
    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard {
        let lock = self.entry(thread_id);
        ThreadGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Try to acquire the thread without waiting.
    ///
    /// Returns `None` when a call is in flight for this thread. Used by
    /// eviction so that state is never removed mid-call.
    #[must_use]
    pub fn try_acquire(&self, thread_id: &str) -> Option<ThreadGuard> {
        let lock = self.entry(thread_id);
        lock.try_lock_owned()
            .ok()
            .map(|guard| ThreadGuard { _guard: guard })
    }

    /// Get or create the lock entry, refreshing its last-access timestamp.
    fn entry(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(thread_id.to_string())
            .and_modify(|(_, last_access)| *last_access = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Remove the entry for a thread if nobody holds or awaits its lock.
    ///
    /// Returns true if the entry was removed. Called after evicting a
    /// thread's conversation state.
    pub fn release_entry(&self, thread_id: &str) -> bool {
        self.locks
            .remove_if(thread_id, |_, (lock, _)| Arc::strong_count(lock) == 1)
            .is_some()
    }

    /// Remove stale lock entries that haven't been accessed recently.
    ///
    /// Only removes entries where nobody else holds a reference to the lock
    /// (strong_count == 1) and the entry hasn't been touched within
    /// `max_age`. Returns the number of entries removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let stale_keys: Vec<_> = self
            .locks
            .iter()
            .filter(|entry| {
                let (lock, last_access) = entry.value();
                Arc::strong_count(lock) == 1 && now.duration_since(*last_access) > max_age
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for key in stale_keys {
            // Re-check under the map entry; a waiter may have arrived since.
            if self
                .locks
                .remove_if(&key, |_, (lock, _)| Arc::strong_count(lock) == 1)
                .is_some()
            {
                count += 1;
            }
        }
        count
    }

    /// Return the number of lock entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Return true if there are no lock entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for ThreadLocks {
    fn default() -> Self {
        Self::new()
    }
}
