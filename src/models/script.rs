use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TenantId = String;
pub type ScriptId = String;

/// Durable view of every hosted script: tenant -> script id -> record.
pub type Snapshot = BTreeMap<TenantId, BTreeMap<ScriptId, ScriptRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    Pending,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub id: ScriptId,
    pub tenant_id: TenantId,
    pub file_name: String,
    pub script_path: String,
    pub status: ScriptStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScriptRecord {
    pub fn new(id: ScriptId, tenant_id: TenantId, file_name: String, script_path: String) -> Self {
        Self {
            id,
            tenant_id,
            file_name,
            script_path,
            status: ScriptStatus::Pending,
            pid: None,
            exit_code: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ScriptStatus::Running
    }

    /// Records a successful spawn. Clears the previous run's end state.
    pub fn mark_running(&mut self, pid: u32, at: DateTime<Utc>) {
        self.status = ScriptStatus::Running;
        self.pid = Some(pid);
        self.started_at = Some(at);
        self.ended_at = None;
        self.exit_code = None;
    }

    pub fn mark_stopped(&mut self, at: DateTime<Utc>) {
        self.status = ScriptStatus::Stopped;
        self.ended_at = Some(at);
    }

    /// Time since the current run started, if it is running.
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match (self.status, self.started_at) {
            (ScriptStatus::Running, Some(started)) => Some(now - started),
            _ => None,
        }
    }
}

/// Per-tenant counters shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSummary {
    pub tenant_id: TenantId,
    pub running: usize,
    pub total: usize,
}

/// Static liveness indicator for external health monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}
