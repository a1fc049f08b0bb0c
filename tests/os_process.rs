#![cfg(target_os = "linux")]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use script_supervisor::process::tree::{descendants, is_pid_alive};
use script_supervisor::process::{Launcher, OsLauncher, Termination};
use script_supervisor::store::{MemoryStore, StateStore};
use script_supervisor::{ScriptStatus, StopOutcome, Supervisor};

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    check()
}

fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn terminate_tree_kills_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let path = script(dir.path(), "tree.sh", "sleep 30 &\nsleep 30 &\nwait\n");
    let launcher = OsLauncher::new("sh");

    let mut handle = launcher.spawn(&path).unwrap();
    let root = handle.pid();
    assert!(wait_until(Duration::from_secs(5), || descendants(root).len() >= 2));
    let children = descendants(root);

    assert_eq!(launcher.terminate_tree(root).unwrap(), Termination::Killed);
    handle.reap();

    assert!(!is_pid_alive(root));
    assert!(wait_until(Duration::from_secs(5), || children.iter().all(|&pid| !is_pid_alive(pid))));
    assert_eq!(launcher.terminate_tree(root).unwrap(), Termination::AlreadyExited);
}

#[test]
fn missing_interpreter_is_spawn_error() {
    let launcher = OsLauncher::new("/nonexistent/interpreter");
    assert!(launcher.spawn(Path::new("demo.py")).is_err());
}

#[test]
fn supervisor_runs_real_processes() {
    let dir = tempfile::tempdir().unwrap();
    let long = script(dir.path(), "long.sh", "sleep 30\n");
    let short = script(dir.path(), "short.sh", "exit 3\n");
    let supervisor = Supervisor::new(StateStore::new(MemoryStore::default()), Arc::new(OsLauncher::new("sh")));

    let running = supervisor.start("42", &long, "long.sh").unwrap();
    let pid = running.pid.unwrap();
    assert!(is_pid_alive(pid));

    let exiting = supervisor.start("42", &short, "short.sh").unwrap();
    assert!(wait_until(Duration::from_secs(5), || supervisor.reap_exited() > 0));
    let exited = supervisor
        .status("42", false)
        .unwrap()
        .into_iter()
        .find(|r| r.id == exiting.id)
        .unwrap();
    assert_eq!(exited.status, ScriptStatus::Stopped);
    assert_eq!(exited.exit_code, Some(3));

    assert_eq!(supervisor.stop(&running.id, "42", false).unwrap(), StopOutcome::Terminated);
    assert!(!is_pid_alive(pid));
}
