//! Teardown of tool processes on exit and on termination signals.
//!
//! The same [`ShutdownHandle`] is called from the normal exit path and from
//! the signal path, possibly both, so shutting down twice must be harmless.

use log::debug;
use std::io;
use std::sync::{MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::process::{ChildRegistry, ProcessPool, SharedPool};

/// How long teardown waits for a resolver to release a pool
const LOCK_GRACE: Duration = Duration::from_millis(200);

/// Terminates every tool process a session started.
#[derive(Clone)]
pub struct ShutdownHandle {
    pools: Vec<SharedPool>,
    children: ChildRegistry,
}

impl ShutdownHandle {
    #[must_use]
    pub fn new(pools: Vec<SharedPool>, children: ChildRegistry) -> Self {
        Self { pools, children }
    }

    /// Terminate all tool processes.
    ///
    /// Idle pools are emptied through their own terminate path. Whatever is
    /// left, including processes held by a resolver stuck on a hung tool and
    /// running disassembler listings, is killed through the registry.
    pub fn shutdown(&self) {
        for pool in &self.pools {
            match lock_for_teardown(pool) {
                Some(mut guard) => guard.terminate_all(),
                None => debug!("Process pool busy, killing its processes directly"),
            }
        }
        self.children.kill_all();
    }
}

fn lock_for_teardown(pool: &SharedPool) -> Option<MutexGuard<'_, ProcessPool>> {
    let deadline = Instant::now() + LOCK_GRACE;
    loop {
        match pool.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) if Instant::now() >= deadline => return None,
            Err(TryLockError::WouldBlock) => thread::sleep(Duration::from_millis(10)),
        }
    }
}

/// Handlers for SIGINT, SIGTERM and SIGABRT.
///
/// Installing them replaces the default disposition right away, so a signal
/// that arrives before anyone awaits [`recv`](Self::recv) is still delivered.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
    abort: Signal,
}

impl TerminationSignals {
    /// Install the handlers. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if a handler cannot be registered.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            abort: signal(SignalKind::from_raw(libc::SIGABRT))?,
        })
    }

    /// Wait for the next termination signal and return its number.
    pub async fn recv(&mut self) -> i32 {
        tokio::select! {
            _ = self.interrupt.recv() => libc::SIGINT,
            _ = self.terminate.recv() => libc::SIGTERM,
            _ = self.abort.recv() => libc::SIGABRT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{lock_pool, ToolCommand};
    use std::path::Path;

    fn cat() -> ToolCommand {
        ToolCommand::new("/bin/sh").args(["-c", "cat"])
    }

    #[test]
    fn test_shutdown_twice() {
        let children = ChildRegistry::new();
        let pool = ProcessPool::new(2, Duration::from_secs(5), children.clone()).shared();
        lock_pool(&pool).acquire(&cat()).unwrap();

        let handle = ShutdownHandle::new(vec![pool.clone()], children);
        handle.clone().shutdown();
        handle.shutdown();

        assert!(lock_pool(&pool).is_empty());
    }

    #[test]
    fn test_shutdown_kills_processes_of_busy_pool() {
        let children = ChildRegistry::new();
        let pool = ProcessPool::new(2, Duration::from_secs(5), children.clone()).shared();
        let handle = ShutdownHandle::new(vec![pool.clone()], children.clone());

        let mut held = lock_pool(&pool);
        let pid = held.acquire(&cat()).unwrap().id();
        handle.shutdown();

        assert!(!children.contains(pid));
        assert!(!Path::new(&format!("/proc/{pid}")).exists());

        // The owner notices on its next teardown without signalling the pid again
        held.terminate_all();
        assert!(held.is_empty());
    }

    #[tokio::test]
    #[allow(unsafe_code)]
    async fn test_signal_before_recv_is_delivered() {
        let mut signals = TerminationSignals::install().unwrap();
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert_eq!(signals.recv().await, libc::SIGINT);
    }
}
