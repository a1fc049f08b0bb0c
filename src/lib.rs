pub mod app;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod process;
pub mod store;
pub mod worker;

pub use error::{ResultCode, StoreError, SupervisorError};
pub use manager::{ReconcileReport, StopOutcome, Supervisor};
pub use models::script::{ScriptRecord, ScriptStatus};
