use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{error, info, warn};

use super::ids::{self, ScriptLocks};
use crate::error::{StoreError, SupervisorError, SupervisorResult};
use crate::models::script::{
    Health, ScriptId, ScriptRecord, ScriptStatus, Snapshot, TenantId, TenantSummary,
};
use crate::process::{Launcher, ProcessTable, Termination};
use crate::store::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A live process tree owned by this instance was killed.
    Terminated,
    /// The record was marked stopped; there was no live process to signal.
    NoProcess,
    /// The script was already stopped; nothing changed.
    AlreadyStopped,
}

pub struct Supervisor {
    store: StateStore,
    table: ProcessTable,
    launcher: Arc<dyn Launcher>,
    locks: ScriptLocks,
}

impl Supervisor {
    pub fn new(store: StateStore, launcher: Arc<dyn Launcher>) -> Self {
        Supervisor {
            store,
            table: ProcessTable::new(),
            launcher,
            locks: ScriptLocks::default(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub(crate) fn launcher(&self) -> &dyn Launcher {
        self.launcher.as_ref()
    }

    /// Creates a record for an uploaded script and runs it. The id's slot is
    /// taken before the Pending record becomes visible to other callers.
    pub fn start(
        &self,
        tenant: &str,
        source_path: &Path,
        file_name: &str,
    ) -> SupervisorResult<ScriptRecord> {
        let script_path = source_path.to_string_lossy().into_owned();
        loop {
            let id = ids::fresh_script_id(&self.store.read()?);
            let slot = self.locks.slot(&id);
            let _held = hold(&slot);

            let created = self.store.update(|snapshot| {
                if ids::is_taken(snapshot, &id) {
                    return Ok::<_, SupervisorError>(false);
                }
                let record = ScriptRecord::new(
                    id.clone(),
                    tenant.to_string(),
                    file_name.to_string(),
                    script_path.clone(),
                );
                snapshot.entry(tenant.to_string()).or_default().insert(id.clone(), record);
                Ok(true)
            })?;
            if !created {
                // a concurrent start claimed the same id
                continue;
            }
            info!("Script '{}' ({}) created for tenant '{}'.", id, file_name, tenant);
            return self.launch(tenant, &id, &script_path);
        }
    }

    pub fn stop(
        &self,
        id: &str,
        requester: &str,
        privileged: bool,
    ) -> SupervisorResult<StopOutcome> {
        let snapshot = self.store.read()?;
        let (tenant, _) = locate(&snapshot, id, requester, privileged)?;
        self.stop_script(&tenant, id)
    }

    /// Kills the current run, if any, and runs the same script under the same id.
    /// The Stopped transition is saved before anything is killed.
    pub fn restart(
        &self,
        id: &str,
        requester: &str,
        privileged: bool,
    ) -> SupervisorResult<ScriptRecord> {
        let slot = self.locks.slot(id);
        let _held = hold(&slot);

        let snapshot = self.store.read()?;
        let (tenant, record) = locate(&snapshot, id, requester, privileged)?;
        if record.status != ScriptStatus::Stopped {
            self.mark_stopped(&tenant, id)?;
        }
        if self.terminate(id) == Termination::Killed {
            info!("Killed previous run of script '{}'.", id);
        }
        let restarted = self.launch(&tenant, id, &record.script_path)?;
        info!("Script '{}' restarted.", id);
        Ok(restarted)
    }

    /// Every record for privileged callers, the caller's own records otherwise.
    pub fn status(&self, tenant: &str, privileged: bool) -> SupervisorResult<Vec<ScriptRecord>> {
        let snapshot = self.store.read()?;
        let records: Vec<ScriptRecord> = if privileged {
            snapshot.into_values().flat_map(|scripts| scripts.into_values()).collect()
        } else {
            snapshot
                .get(tenant)
                .map(|scripts| scripts.values().cloned().collect())
                .unwrap_or_default()
        };
        Ok(records)
    }

    /// Stops every running script across all tenants. Returns how many were stopped.
    pub fn kill_all(&self, requester: &str, privileged: bool) -> SupervisorResult<usize> {
        if !privileged {
            let target = format!("kill-all requested by '{}'", requester);
            return Err(SupervisorError::Forbidden(target));
        }

        let snapshot = self.store.read()?;
        let running: Vec<(TenantId, ScriptId)> = snapshot
            .iter()
            .flat_map(|(tenant, scripts)| {
                scripts
                    .values()
                    .filter(|record| record.is_running())
                    .map(move |record| (tenant.clone(), record.id.clone()))
            })
            .collect();

        let mut count = 0;
        for (tenant, id) in running {
            match self.stop_script(&tenant, &id) {
                Ok(StopOutcome::Terminated) | Ok(StopOutcome::NoProcess) => count += 1,
                Ok(StopOutcome::AlreadyStopped) => {}
                Err(e) => error!("Failed to stop script '{}' of tenant '{}': {}", id, tenant, e),
            }
        }
        info!("Kill-all by '{}' stopped {} scripts.", requester, count);
        Ok(count)
    }

    pub fn list_tenants(&self, privileged: bool) -> SupervisorResult<Vec<TenantSummary>> {
        if !privileged {
            return Err(SupervisorError::Forbidden("tenant listing".to_string()));
        }
        let snapshot = self.store.read()?;
        Ok(snapshot
            .iter()
            .map(|(tenant, scripts)| TenantSummary {
                tenant_id: tenant.clone(),
                running: scripts.values().filter(|record| record.is_running()).count(),
                total: scripts.len(),
            })
            .collect())
    }

    /// Removes table entries whose process exited on its own and records them
    /// as stopped. Returns the number of scripts reaped.
    pub fn reap_exited(&self) -> usize {
        let mut reaped = 0;
        for id in self.table.ids() {
            let slot = self.locks.slot(&id);
            let _held = hold(&slot);

            let Some((mut handle, code)) = self.table.take_if_exited(&id) else {
                continue;
            };
            handle.reap();
            let pid = handle.pid();
            let now = Utc::now();
            let result = self.store.update(|snapshot| {
                let record = find_mut(snapshot, &id)
                    .filter(|record| record.is_running() && record.pid == Some(pid));
                if let Some(record) = record {
                    record.mark_stopped(now);
                    record.exit_code = code;
                }
                Ok::<_, StoreError>(())
            });
            match result {
                Ok(()) => info!("Script '{}' (process {}) exited with code {:?}.", id, pid, code),
                Err(e) => error!("Failed to record exit of script '{}': {}", id, e),
            }
            reaped += 1;
        }
        reaped
    }

    pub fn health(&self) -> Health {
        Health {
            status: "running",
            timestamp: Utc::now(),
        }
    }

    /// Stop sequence shared by `stop` and `kill_all`. The store is updated
    /// before the process is killed so a failed save leaves everything as it was.
    fn stop_script(&self, tenant: &str, id: &str) -> SupervisorResult<StopOutcome> {
        let slot = self.locks.slot(id);
        let _held = hold(&slot);

        let tracked = self.table.contains(id);
        let changed = self.mark_stopped(tenant, id)?;

        if !changed && !tracked {
            info!("Script '{}' is already stopped.", id);
            return Ok(StopOutcome::AlreadyStopped);
        }

        let outcome = match self.terminate(id) {
            Termination::Killed => StopOutcome::Terminated,
            Termination::AlreadyExited | Termination::NotTracked if changed => {
                StopOutcome::NoProcess
            }
            Termination::AlreadyExited | Termination::NotTracked => {
                StopOutcome::AlreadyStopped
            }
        };
        info!("Script '{}' stopped ({:?}).", id, outcome);
        Ok(outcome)
    }

    /// Persists the Stopped transition of one record. Returns false when it was
    /// already stopped, in which case nothing is saved.
    fn mark_stopped(&self, tenant: &str, id: &str) -> SupervisorResult<bool> {
        let now = Utc::now();
        self.store.update(|snapshot| -> SupervisorResult<bool> {
            let record = snapshot
                .get_mut(tenant)
                .and_then(|scripts| scripts.get_mut(id))
                .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
            if record.status == ScriptStatus::Stopped {
                return Ok(false);
            }
            record.mark_stopped(now);
            Ok(true)
        })
    }

    /// Spawns `script_path`, registers the handle, then marks the record running.
    /// Caller must hold the script's slot.
    fn launch(&self, tenant: &str, id: &str, script_path: &str) -> SupervisorResult<ScriptRecord> {
        let handle = match self.launcher.spawn(Path::new(script_path)) {
            Ok(handle) => handle,
            Err(source) => {
                error!("Failed to spawn script '{}' from {}: {}", id, script_path, source);
                let now = Utc::now();
                let marked = self.store.update(|snapshot| {
                    let record = snapshot.get_mut(tenant).and_then(|scripts| scripts.get_mut(id));
                    if let Some(record) = record {
                        record.mark_stopped(now);
                    }
                    Ok::<_, StoreError>(())
                });
                if let Err(e) = marked {
                    error!("Failed to record spawn failure of script '{}': {}", id, e);
                }
                return Err(SupervisorError::Spawn {
                    path: script_path.to_string(),
                    source,
                });
            }
        };

        let pid = handle.pid();
        if let Some(mut stale) = self.table.register(id, handle) {
            warn!("Replaced stale handle {} for script '{}'.", stale.pid(), id);
            if self.launcher.terminate_tree(stale.pid()).is_ok() {
                stale.reap();
            }
        }

        let now = Utc::now();
        let updated = self.store.update(|snapshot| -> SupervisorResult<ScriptRecord> {
            let record = snapshot
                .get_mut(tenant)
                .and_then(|scripts| scripts.get_mut(id))
                .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
            record.mark_running(pid, now);
            Ok(record.clone())
        });

        match updated {
            Ok(record) => {
                info!("Script '{}' running as process {}.", id, pid);
                Ok(record)
            }
            Err(e) => {
                warn!("Could not persist start of script '{}', killing process {}.", id, pid);
                self.terminate(id);
                Err(e)
            }
        }
    }

    /// Kills the tree of the handle registered for `id` and drops the entry.
    fn terminate(&self, id: &str) -> Termination {
        let Some(mut handle) = self.table.remove(id) else {
            return Termination::NotTracked;
        };
        let pid = handle.pid();
        match self.launcher.terminate_tree(pid) {
            Ok(outcome) => {
                handle.reap();
                outcome
            }
            Err(e) => {
                // not reaped: waiting on a process we failed to kill could block forever
                error!("Failed to terminate process tree {} of script '{}': {}", pid, id, e);
                Termination::NotTracked
            }
        }
    }
}

fn hold(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_mut<'a>(snapshot: &'a mut Snapshot, id: &str) -> Option<&'a mut ScriptRecord> {
    snapshot.values_mut().find_map(|scripts| scripts.get_mut(id))
}

/// Resolves the owning tenant of `id` under the caller's authorization scope.
fn locate(
    snapshot: &Snapshot,
    id: &str,
    requester: &str,
    privileged: bool,
) -> SupervisorResult<(TenantId, ScriptRecord)> {
    if let Some(record) = snapshot.get(requester).and_then(|scripts| scripts.get(id)) {
        return Ok((requester.to_string(), record.clone()));
    }
    let owner = snapshot.iter().find_map(|(tenant, scripts)| {
        scripts.get(id).map(|record| (tenant.clone(), record.clone()))
    });
    match owner {
        Some(found) if privileged => Ok(found),
        Some(_) => Err(SupervisorError::Forbidden(id.to_string())),
        None => Err(SupervisorError::NotFound(id.to_string())),
    }
}
