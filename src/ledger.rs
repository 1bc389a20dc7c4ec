//! Process-lifetime dedup ledger.
//!
//! The ledger remembers which dedup keys have produced an activity. It starts
//! empty, only grows, and is reset by a restart or an explicit [`DedupLedger::clear`].

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Set of dedup keys that must not produce another activity
pub trait DedupLedger: Send + Sync {
    /// Whether `key` was already committed
    fn contains(&self, key: &str) -> bool;

    /// Commit `key`. Returns `false` if it was already present.
    fn insert(&self, key: &str) -> bool;

    /// Administrative reset
    fn clear(&self);

    /// Number of committed keys
    fn len(&self) -> usize;

    /// Whether nothing was committed yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutex-guarded in-memory ledger; `insert` is an atomic insert-if-absent.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    keys: Mutex<HashSet<String>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DedupLedger for InMemoryLedger {
    fn contains(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    fn insert(&self, key: &str) -> bool {
        self.keys().insert(key.to_string())
    }

    fn clear(&self) {
        self.keys().clear();
    }

    fn len(&self) -> usize {
        self.keys().len()
    }
}
