use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use log::warn;

use super::ProcessHandle;
use crate::models::script::ScriptId;

/// Live handles for processes spawned by this supervisor instance.
/// Never persisted; empty after every restart.
#[derive(Default)]
pub struct ProcessTable {
    entries: Mutex<HashMap<ScriptId, Box<dyn ProcessHandle>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` under `id`, returning any handle it replaced.
    pub fn register(&self, id: &str, handle: Box<dyn ProcessHandle>) -> Option<Box<dyn ProcessHandle>> {
        self.lock().insert(id.to_string(), handle)
    }

    pub fn lookup(&self, id: &str) -> Option<u32> {
        self.lock().get(id).map(|handle| handle.pid())
    }

    pub fn remove(&self, id: &str) -> Option<Box<dyn ProcessHandle>> {
        self.lock().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn ids(&self) -> Vec<ScriptId> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns the entry for `id` if its process has exited.
    /// The outer `Option` is `None` while it is still running.
    pub fn take_if_exited(&self, id: &str) -> Option<(Box<dyn ProcessHandle>, Option<i32>)> {
        let mut entries = self.lock();
        let handle = entries.get_mut(id)?;
        match handle.try_exit() {
            Ok(Some(code)) => entries.remove(id).map(|handle| (handle, code)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to poll process {} for script '{}': {}", handle.pid(), id, e);
                None
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ScriptId, Box<dyn ProcessHandle>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct Scripted {
        pid: u32,
        exit: Option<Option<i32>>,
    }

    impl ProcessHandle for Scripted {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn try_exit(&mut self) -> io::Result<Option<Option<i32>>> {
            Ok(self.exit)
        }

        fn reap(&mut self) {}
    }

    #[test]
    fn register_lookup_remove() {
        let table = ProcessTable::new();
        assert!(table.is_empty());
        table.register("abc", Box::new(Scripted { pid: 10, exit: None }));

        assert_eq!(table.lookup("abc"), Some(10));
        assert!(table.contains("abc"));
        assert_eq!(table.remove("abc").map(|h| h.pid()), Some(10));
        assert!(table.lookup("abc").is_none());
        assert!(table.remove("abc").is_none());
    }

    #[test]
    fn register_returns_replaced_handle() {
        let table = ProcessTable::new();
        table.register("abc", Box::new(Scripted { pid: 1, exit: None }));
        let old = table.register("abc", Box::new(Scripted { pid: 2, exit: None }));
        assert_eq!(old.map(|h| h.pid()), Some(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn only_exited_entries_are_taken() {
        let table = ProcessTable::new();
        table.register("live", Box::new(Scripted { pid: 1, exit: None }));
        table.register("dead", Box::new(Scripted { pid: 2, exit: Some(Some(3)) }));

        assert!(table.take_if_exited("live").is_none());
        let (handle, code) = table.take_if_exited("dead").unwrap();
        assert_eq!(handle.pid(), 2);
        assert_eq!(code, Some(3));
        assert_eq!(table.ids(), vec!["live".to_string()]);
    }
}
