mod json_file;
mod memory;

use std::sync::{Mutex, PoisonError};

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::{StoreError, StoreResult};
use crate::models::script::Snapshot;

/// Durable storage for the full snapshot. Implementations only need to read
/// and replace the whole thing; serialization of callers happens in `StateStore`.
pub trait StoreBackend: Send + Sync {
    fn load(&self) -> StoreResult<Snapshot>;
    fn save(&self, snapshot: &Snapshot) -> StoreResult<()>;
}

/// Serializes every read-modify-write cycle behind one lock.
pub struct StateStore {
    backend: Box<dyn StoreBackend>,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        StateStore {
            backend: Box::new(backend),
            lock: Mutex::new(()),
        }
    }

    pub fn read(&self) -> StoreResult<Snapshot> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.backend.load()
    }

    /// Loads the snapshot, applies `mutate` and saves the result.
    ///
    /// Nothing is written when `mutate` fails. A failed save surfaces as
    /// `StoreError` and the mutated copy is dropped.
    pub fn update<T, E, F>(&self, mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = self.backend.load()?;
        let value = mutate(&mut snapshot)?;
        self.backend.save(&snapshot)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::models::script::ScriptRecord;

    fn record(tenant: &str, id: &str) -> ScriptRecord {
        ScriptRecord::new(id.into(), tenant.into(), "a.py".into(), "/tmp/a.py".into())
    }

    struct FailingSave {
        inner: MemoryStore,
        fail: Arc<AtomicBool>,
    }

    impl StoreBackend for FailingSave {
        fn load(&self) -> StoreResult<Snapshot> {
            self.inner.load()
        }

        fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
            }
            self.inner.save(snapshot)
        }
    }

    #[test]
    fn failed_save_leaves_previous_snapshot() {
        let fail = Arc::new(AtomicBool::new(false));
        let store = StateStore::new(FailingSave {
            inner: MemoryStore::default(),
            fail: Arc::clone(&fail),
        });
        store
            .update(|snap| {
                snap.entry("t".into()).or_default().insert("one".into(), record("t", "one"));
                Ok::<_, StoreError>(())
            })
            .unwrap();

        fail.store(true, Ordering::SeqCst);
        let result = store.update(|snap| {
            snap.entry("t".into()).or_default().insert("two".into(), record("t", "two"));
            Ok::<_, StoreError>(())
        });

        assert!(matches!(result, Err(StoreError::Io(_))));
        let snapshot = store.read().unwrap();
        assert_eq!(snapshot["t"].len(), 1);
        assert!(snapshot["t"].contains_key("one"));
    }

    #[test]
    fn mutate_error_skips_save() {
        let store = StateStore::new(MemoryStore::default());
        let result: Result<(), StoreError> = store.update(|snap| {
            snap.insert("t".into(), Default::default());
            Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "abort")))
        });
        assert!(result.is_err());
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(StateStore::new(MemoryStore::default()));
        let workers: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        let id = format!("{}-{}", n, i);
                        store
                            .update(|snap| {
                                snap.entry("t".into()).or_default().insert(id.clone(), record("t", &id));
                                Ok::<_, StoreError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(store.read().unwrap()["t"].len(), 200);
    }
}
