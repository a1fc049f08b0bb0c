//! Process-tree helpers built on `/proc` and `libc::kill`.

#[cfg(target_os = "linux")]
use std::collections::{HashMap, HashSet};
use std::io;

use log::{debug, warn};

use super::Termination;

/// Returns every descendant of `root`, parents before children.
#[cfg(target_os = "linux")]
pub fn descendants(root: u32) -> Vec<u32> {
    let parents = match parent_map() {
        Ok(parents) => parents,
        Err(e) => {
            warn!("Failed to read process table: {}", e);
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = vec![root];
    while let Some(pid) = queue.pop() {
        if !seen.insert(pid) {
            continue;
        }
        if let Some(children) = parents.get(&pid) {
            for &child in children {
                found.push(child);
                queue.push(child);
            }
        }
    }
    found
}

#[cfg(not(target_os = "linux"))]
pub fn descendants(_root: u32) -> Vec<u32> {
    Vec::new()
}

/// parent pid -> child pids, from `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
fn parent_map() -> io::Result<HashMap<u32, Vec<u32>>> {
    let mut parents: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in std::fs::read_dir("/proc")? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        // the process may exit between read_dir and the read
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some((_, ppid)) = parse_stat(&stat) {
            parents.entry(ppid).or_default().push(pid);
        }
    }
    Ok(parents)
}

/// Extracts (state, ppid) from a `/proc/<pid>/stat` line. The command name
/// may contain spaces and parentheses, so fields are read after the last ')'.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat(stat: &str) -> Option<(char, u32)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some((state, ppid))
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| parse_stat(&stat))
        .map_or(false, |(state, _)| state == 'Z')
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Sends SIGKILL. `Ok(false)` means the process no longer exists.
fn kill(pid: u32) -> io::Result<bool> {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return Ok(false);
    };
    if raw <= 0 {
        return Ok(false);
    }
    if unsafe { libc::kill(raw, libc::SIGKILL) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        _ => Err(err),
    }
}

/// Kills the whole tree under `root`, deepest descendants first, then `root`.
pub fn terminate_tree(root: u32) -> io::Result<Termination> {
    let root_alive = is_pid_alive(root);
    let children = descendants(root);
    let mut killed = 0;
    for &pid in children.iter().rev() {
        match kill(pid) {
            Ok(true) => {
                debug!("Killed descendant {} of {}", pid, root);
                killed += 1;
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to kill descendant {} of {}: {}", pid, root, e),
        }
    }

    // a zombie root still accepts the signal; it only counts if it was alive
    let delivered = kill(root)?;
    if (delivered && root_alive) || killed > 0 {
        Ok(Termination::Killed)
    } else {
        Ok(Termination::AlreadyExited)
    }
}

/// Signal-0 probe. EPERM still means the pid exists; zombies count as dead.
pub fn is_pid_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    if unsafe { libc::kill(raw, 0) } != 0 {
        return io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    }
    !is_zombie(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stat_with_odd_command_names() {
        let stat = "1234 (python3 (demo) x) S 99 1234 1234 0 -1 4194560";
        assert_eq!(parse_stat(stat), Some(('S', 99)));
        assert_eq!(parse_stat("garbage"), None);
    }

    #[test]
    fn invalid_pids_are_never_alive() {
        assert!(!is_pid_alive(0));
        assert!(!is_pid_alive(u32::MAX));
    }

    #[test]
    fn own_process_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn terminating_missing_pid_is_already_exited() {
        // pid_max on Linux never reaches this value
        assert_eq!(terminate_tree(0x3fff_fff0).unwrap(), Termination::AlreadyExited);
    }
}
