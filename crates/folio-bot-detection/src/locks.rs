//! Per-key async locks.
//!
//! Analyses of requests from the same source IP read and then update that
//! source's metadata, so they are serialized on the IP. Different sources
//! proceed in parallel.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Access is released when the guard drops.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = slot.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Keys that currently have a holder or waiters
    pub fn active_keys(&self) -> usize {
        self.locks.lock().len()
    }
}

pub struct KeyGuard {
    key: String,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only reflects the map and waiters
        drop(self.guard.take());

        let mut locks = self.locks.lock();
        if let Some(slot) = locks.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                locks.remove(&self.key);
            }
        }
    }
}
