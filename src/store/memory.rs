use std::sync::{Mutex, PoisonError};

use super::StoreBackend;
use crate::error::StoreResult;
use crate::models::script::Snapshot;

/// Volatile backend, useful for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        MemoryStore {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl StoreBackend for MemoryStore {
    fn load(&self) -> StoreResult<Snapshot> {
        Ok(self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(())
    }
}
