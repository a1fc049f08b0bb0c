pub mod ids;
pub mod reconciler;
pub mod supervisor;

pub use reconciler::ReconcileReport;
pub use supervisor::{StopOutcome, Supervisor};
