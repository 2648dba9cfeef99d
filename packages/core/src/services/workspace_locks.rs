//! Per-workspace write serialization
//!
//! SQLite already admits one writer at a time, but a cascade computes its
//! subtree before writing. Holding the workspace lock across the whole
//! transaction keeps that subtree stable, and lets writers in different
//! workspaces queue independently instead of spinning on `SQLITE_BUSY`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct WorkspaceLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `workspace_id`
    pub async fn acquire(&self, workspace_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Only the map holds an idle lock; drop those before adding ours
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(workspace_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
