use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::models::script::{ScriptId, Snapshot};

pub const SCRIPT_ID_LEN: usize = 8;

pub fn random_script_id() -> ScriptId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SCRIPT_ID_LEN)
        .map(char::from)
        .collect()
}

/// Draws ids until one is unused by every tenant in `snapshot`.
pub fn fresh_script_id(snapshot: &Snapshot) -> ScriptId {
    fresh_script_id_with(snapshot, random_script_id)
}

fn fresh_script_id_with(snapshot: &Snapshot, mut draw: impl FnMut() -> ScriptId) -> ScriptId {
    loop {
        let id = draw();
        if !is_taken(snapshot, &id) {
            return id;
        }
    }
}

pub fn is_taken(snapshot: &Snapshot, id: &str) -> bool {
    snapshot.values().any(|scripts| scripts.contains_key(id))
}

/// One mutex per script id so mutations of the same script run one at a time
/// while unrelated scripts proceed in parallel.
#[derive(Default)]
pub struct ScriptLocks {
    slots: Mutex<HashMap<ScriptId, Arc<Mutex<()>>>>,
}

impl ScriptLocks {
    pub fn slot(&self, id: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // a slot referenced only by the map has no holder or waiter
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        Arc::clone(slots.entry(id.to_string()).or_default())
    }
}
