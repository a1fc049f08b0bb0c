mod os;
mod table;
pub mod tree;

use std::io;
use std::path::Path;

pub use os::OsLauncher;
pub use table::ProcessTable;

/// Outcome of terminating a script's process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A live process tree was signalled.
    Killed,
    /// The process had already exited before the signal landed.
    AlreadyExited,
    /// This supervisor instance holds no handle for the script.
    NotTracked,
}

/// A spawned OS process owned by the process table.
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// Non-blocking exit check. `Some(code)` once the process has exited;
    /// `code` is `None` when it was killed by a signal.
    fn try_exit(&mut self) -> io::Result<Option<Option<i32>>>;

    /// Collects the exit status after the tree has been killed.
    fn reap(&mut self);
}

/// Creates and signals script processes. Swapped for a fake in tests.
pub trait Launcher: Send + Sync {
    fn spawn(&self, script: &Path) -> io::Result<Box<dyn ProcessHandle>>;

    /// Kills `pid` and all of its descendants. A process that is already gone
    /// is reported as `Termination::AlreadyExited`, never as an error.
    fn terminate_tree(&self, pid: u32) -> io::Result<Termination>;

    fn is_alive(&self, pid: u32) -> bool;
}
