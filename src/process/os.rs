use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use log::{info, warn};

use super::{tree, Launcher, ProcessHandle, Termination};

/// Runs each script as `<interpreter> <script>` with stdio detached.
pub struct OsLauncher {
    interpreter: PathBuf,
}

impl OsLauncher {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        OsLauncher {
            interpreter: interpreter.into(),
        }
    }
}

struct OsProcess {
    child: Child,
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn try_exit(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(self.child.try_wait()?.map(|status| status.code()))
    }

    fn reap(&mut self) {
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap process {}: {}", self.child.id(), e);
        }
    }
}

impl Launcher for OsLauncher {
    fn spawn(&self, script: &Path) -> io::Result<Box<dyn ProcessHandle>> {
        let child = Command::new(&self.interpreter)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!(
            "Spawned '{} {}' as process {}.",
            self.interpreter.display(),
            script.display(),
            child.id()
        );
        Ok(Box::new(OsProcess { child }))
    }

    fn terminate_tree(&self, pid: u32) -> io::Result<Termination> {
        tree::terminate_tree(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        tree::is_pid_alive(pid)
    }
}
