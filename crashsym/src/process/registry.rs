//! Live child processes, reachable without going through a pool lock.
//!
//! A resolver can sit on a pool lock for a whole batch while it waits on a
//! hung tool. Teardown on a signal cannot wait for that, so every spawned
//! tool is also recorded here and can be killed directly.

#![allow(unsafe_code)] // kill() and waitpid() require unsafe

use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// How long killed process groups get to exit after SIGTERM
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Pids of spawned tools that have not been reaped yet.
///
/// Each tool runs as the leader of its own process group, so signalling the
/// group also reaches anything the tool started.
#[derive(Debug, Clone, Default)]
pub struct ChildRegistry {
    pids: Arc<Mutex<HashSet<u32>>>,
}

impl ChildRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32) {
        self.lock().insert(pid);
    }

    /// Forget a pid once its owner has reaped it.
    pub fn unregister(&self, pid: u32) {
        self.lock().remove(&pid);
    }

    #[must_use]
    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains(&pid)
    }

    /// Terminate and reap every registered tool, whoever owns it.
    ///
    /// Owners find their pid gone from the registry and do not signal it
    /// again.
    pub fn kill_all(&self) {
        let pids: Vec<libc::pid_t> = {
            let mut registered = self.lock();
            registered.drain().filter_map(|pid| libc::pid_t::try_from(pid).ok()).collect()
        };
        if pids.is_empty() {
            return;
        }

        debug!("Killing {} tool processes directly", pids.len());
        for &pid in &pids {
            signal_group(pid, libc::SIGTERM);
        }

        let deadline = Instant::now() + KILL_GRACE;
        let mut remaining = pids;
        while !remaining.is_empty() && Instant::now() < deadline {
            remaining.retain(|&pid| !try_reap(pid));
            thread::sleep(Duration::from_millis(5));
        }

        for pid in remaining {
            warn!("Tool process {pid} ignored SIGTERM, killing it");
            signal_group(pid, libc::SIGKILL);
            reap(pid);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<u32>> {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Signal a tool and everything in its process group.
///
/// Only called for pids that are registered, and pids stay registered until
/// they are reaped, so the group id cannot have been reused.
pub(crate) fn signal_group(pid: libc::pid_t, signal: libc::c_int) {
    unsafe {
        libc::kill(-pid, signal);
    }
}

/// Reap `pid` if it has exited. `true` once it is gone, including when its
/// owner reaped it first.
fn try_reap(pid: libc::pid_t) -> bool {
    let mut status = 0;
    let reaped = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
    reaped != 0
}

fn reap(pid: libc::pid_t) {
    let mut status = 0;
    unsafe {
        libc::waitpid(pid, &mut status, 0);
    }
}
