#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use script_supervisor::error::{StoreError, StoreResult};
use script_supervisor::models::script::Snapshot;
use script_supervisor::process::{Launcher, ProcessHandle, Termination};
use script_supervisor::store::{MemoryStore, StateStore, StoreBackend};
use script_supervisor::Supervisor;

#[derive(Default)]
struct Procs {
    alive: HashSet<u32>,
    exit_codes: HashMap<u32, Option<i32>>,
}

/// In-memory stand-in for the OS: pids are counters, kills flip a set.
pub struct FakeLauncher {
    next_pid: AtomicU32,
    procs: Arc<Mutex<Procs>>,
    kills: AtomicUsize,
    fail_spawns: AtomicBool,
    spawned: Mutex<Vec<PathBuf>>,
    gate: Mutex<Option<Arc<Barrier>>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeLauncher {
            next_pid: AtomicU32::new(1000),
            procs: Arc::default(),
            kills: AtomicUsize::new(0),
            fail_spawns: AtomicBool::new(false),
            spawned: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    /// Simulates the process exiting on its own.
    pub fn exit(&self, pid: u32, code: i32) {
        let mut procs = self.procs.lock().unwrap();
        procs.alive.remove(&pid);
        procs.exit_codes.insert(pid, Some(code));
    }

    /// Marks an arbitrary pid as alive, e.g. an orphan from a previous instance.
    pub fn adopt(&self, pid: u32) {
        self.procs.lock().unwrap().alive.insert(pid);
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.fail_spawns.store(fail, Ordering::SeqCst);
    }

    pub fn spawned(&self) -> Vec<PathBuf> {
        self.spawned.lock().unwrap().clone()
    }

    /// Makes the next spawn wait on the returned barrier twice: once on entry,
    /// once before it returns.
    pub fn gate_next_spawn(&self) -> Arc<Barrier> {
        let gate = Arc::new(Barrier::new(2));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

struct FakeProcess {
    pid: u32,
    procs: Arc<Mutex<Procs>>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_exit(&mut self) -> io::Result<Option<Option<i32>>> {
        let procs = self.procs.lock().unwrap();
        if procs.alive.contains(&self.pid) {
            return Ok(None);
        }
        Ok(Some(procs.exit_codes.get(&self.pid).copied().flatten()))
    }

    fn reap(&mut self) {}
}

impl Launcher for FakeLauncher {
    fn spawn(&self, script: &Path) -> io::Result<Box<dyn ProcessHandle>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        if self.fail_spawns.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "interpreter missing"));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.procs.lock().unwrap().alive.insert(pid);
        self.spawned.lock().unwrap().push(script.to_path_buf());
        Ok(Box::new(FakeProcess {
            pid,
            procs: Arc::clone(&self.procs),
        }))
    }

    fn terminate_tree(&self, pid: u32) -> io::Result<Termination> {
        let mut procs = self.procs.lock().unwrap();
        if procs.alive.remove(&pid) {
            procs.exit_codes.insert(pid, None);
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(Termination::Killed)
        } else {
            Ok(Termination::AlreadyExited)
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.procs.lock().unwrap().alive.contains(&pid)
    }
}

/// Memory backend whose saves can be made to fail.
pub struct FlakyStore {
    inner: MemoryStore,
    fail: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: MemoryStore::default(),
            fail: Arc::clone(&fail),
        };
        (store, fail)
    }
}

impl StoreBackend for FlakyStore {
    fn load(&self) -> StoreResult<Snapshot> {
        self.inner.load()
    }

    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            let cause = io::Error::new(io::ErrorKind::Other, "read-only filesystem");
            return Err(StoreError::Io(cause));
        }
        self.inner.save(snapshot)
    }
}

pub fn supervisor() -> (Supervisor, Arc<FakeLauncher>) {
    let launcher = FakeLauncher::new();
    let supervisor = Supervisor::new(StateStore::new(MemoryStore::default()), launcher.clone());
    (supervisor, launcher)
}

pub fn supervisor_with(backend: impl StoreBackend + 'static) -> (Supervisor, Arc<FakeLauncher>) {
    let launcher = FakeLauncher::new();
    let supervisor = Supervisor::new(StateStore::new(backend), launcher.clone());
    (supervisor, launcher)
}
