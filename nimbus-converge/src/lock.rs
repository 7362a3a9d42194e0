//! Named mutual exclusion keyed by parent resource id.
//!
//! Some control planes do not arbitrate concurrent mutations of the same
//! parent (e.g. two interfaces attached to one NAS volume at once). Callers
//! take the parent's lock for the mutation and its convergence wait.
//! Different keys never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::cancel::CancelSignal;
use crate::error::{ConvergeError, Result};

type Slot = Arc<AsyncMutex<()>>;

/// Registry of per-key locks. Share it via `Arc` with every controller that
/// needs exclusion.
#[derive(Default)]
pub struct LockRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

/// Held lock for one key. Released on drop.
pub struct KeyGuard {
    registry: Arc<LockRegistry>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// Wait for the lock on `key`.
    pub async fn lock(self: &Arc<Self>, key: &str) -> KeyGuard {
        let slot = self.slot(key);
        let guard = slot.lock_owned().await;
        trace!(key, "named lock acquired");
        KeyGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Wait for the lock on `key` unless `cancel` fires first.
    pub async fn lock_or_cancel(self: &Arc<Self>, key: &str, cancel: &CancelSignal) -> Result<KeyGuard> {
        let mut cancel = cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.prune(key);
                Err(ConvergeError::Cancelled)
            }
            guard = self.lock(key) => Ok(guard),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Drops the slot when nobody else references it.
    fn prune(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(key);
        }
    }
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.prune(&self.key);
        trace!(key = %self.key, "named lock released");
    }
}
