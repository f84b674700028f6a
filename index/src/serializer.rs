//! Per-path mutual exclusion for document writes and index updates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Hands out one async lock per vault-relative path.
///
/// Waiters on the same path are served in arrival order; distinct paths
/// never block each other. An entry lives only while someone holds or waits
/// for it.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    entries: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Exclusive access to one path until dropped.
#[derive(Debug)]
pub struct PathGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: PathLocks,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: impl Into<String>) -> PathGuard {
        let key = key.into();
        let mutex = {
            let mut entries = self.entries();
            // Entries abandoned by cancelled waiters.
            entries.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        let guard = mutex.lock_owned().await;
        PathGuard {
            key,
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    /// Number of paths currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.entries()
            .values()
            .filter(|mutex| Arc::strong_count(mutex) > 1)
            .count()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PathGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        let mut entries = self.locks.entries();
        self.guard.take();
        if entries
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            entries.remove(&self.key);
        }
    }
}
