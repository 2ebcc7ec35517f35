//! Per-principal async locks.
//!
//! Entries are weak so the map never keeps a lock alive after the last holder
//! drops it. Dead entries are pruned whenever a new lock is created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Guard = tokio::sync::Mutex<()>;

#[derive(Default)]
pub struct PrincipalLocks {
    inner: Mutex<HashMap<String, Weak<Guard>>>,
}

impl PrincipalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for a principal, creating it if nobody holds one.
    pub fn get(&self, principal: &str) -> Arc<Guard> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = map.get(principal).and_then(Weak::upgrade) {
            return existing;
        }

        map.retain(|_, weak| weak.strong_count() > 0);

        let guard = Arc::new(Guard::new(()));
        map.insert(principal.to_string(), Arc::downgrade(&guard));
        guard
    }

    /// Number of tracked principals, including entries not yet pruned.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
