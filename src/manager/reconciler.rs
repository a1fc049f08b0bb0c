use chrono::Utc;
use log::{info, warn};

use super::supervisor::Supervisor;
use crate::error::SupervisorResult;
use crate::models::script::ScriptStatus;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records found Running or Pending.
    pub checked: usize,
    /// Records moved to Stopped.
    pub stopped: usize,
    /// Of those, how many still had a live pid nobody here can signal.
    pub orphaned: usize,
}

impl Supervisor {
    /// Resolves records left Running or Pending by a previous instance.
    ///
    /// Must run once before the supervisor serves requests. Only processes in
    /// this instance's table stay Running; everything else is marked Stopped,
    /// including pids that are still alive, since ownership of those cannot be
    /// proven after a restart.
    pub fn reconcile(&self) -> SupervisorResult<ReconcileReport> {
        let now = Utc::now();
        let report = self.store().update(|snapshot| {
            let mut report = ReconcileReport::default();
            for record in snapshot.values_mut().flat_map(|scripts| scripts.values_mut()) {
                if record.status == ScriptStatus::Stopped {
                    continue;
                }
                report.checked += 1;
                if record.is_running() && self.table().contains(&record.id) {
                    continue;
                }

                if let Some(pid) = record.pid.filter(|_| record.is_running()) {
                    if self.launcher().is_alive(pid) {
                        warn!(
                            "Script '{}' of tenant '{}' left process {} alive; \
                             it is no longer supervised.",
                            record.id, record.tenant_id, pid
                        );
                        report.orphaned += 1;
                    }
                }
                record.mark_stopped(now);
                report.stopped += 1;
            }
            Ok::<_, crate::error::StoreError>(report)
        })?;

        info!(
            "Reconciled {} stale records ({} stopped, {} orphaned).",
            report.checked, report.stopped, report.orphaned
        );
        Ok(report)
    }
}
