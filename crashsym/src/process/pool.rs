//! Bounded LRU pool of long-lived tool processes.

use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::channel::{ToolCommand, ToolProcess};
use super::registry::ChildRegistry;
use crate::domain::SymbolError;

/// Pool handle shared by the resolvers and the shutdown hook
pub type SharedPool = Arc<Mutex<ProcessPool>>;

/// Keeps up to `capacity` tool processes alive, keyed by their exact command.
///
/// Recency is updated on every [`acquire`](Self::acquire), not on I/O: a
/// process counts as used whenever it is handed out.
pub struct ProcessPool {
    capacity: usize,
    io_timeout: Duration,
    children: ChildRegistry,
    /// Most recently acquired first
    channels: VecDeque<ToolProcess>,
}

impl ProcessPool {
    #[must_use]
    pub fn new(capacity: usize, io_timeout: Duration, children: ChildRegistry) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, io_timeout, children, channels: VecDeque::with_capacity(capacity) }
    }

    #[must_use]
    pub fn shared(self) -> SharedPool {
        Arc::new(Mutex::new(self))
    }

    /// Get the process for `command`, spawning it if needed.
    ///
    /// When the pool is full the least recently acquired process is
    /// terminated first.
    ///
    /// # Errors
    /// Returns [`SymbolError::SpawnFailed`] if a new process cannot be started.
    /// The pool itself stays usable.
    pub fn acquire(&mut self, command: &ToolCommand) -> Result<&mut ToolProcess, SymbolError> {
        if let Some(idx) = self.position(command) {
            if idx != 0 {
                if let Some(channel) = self.channels.remove(idx) {
                    self.channels.push_front(channel);
                }
            }
            return Ok(&mut self.channels[0]);
        }

        while self.channels.len() >= self.capacity {
            if let Some(lru) = self.channels.pop_back() {
                debug!("Pool full, evicting {}", lru.command());
                Self::shut_down(lru);
            }
        }

        let channel = ToolProcess::spawn_interactive(command, self.io_timeout, &self.children)?;
        self.channels.push_front(channel);
        Ok(&mut self.channels[0])
    }

    /// Terminate and forget the process for `command`, if any.
    ///
    /// Used after a failed exchange, when the process output can no longer
    /// be trusted to line up with requests.
    pub fn discard(&mut self, command: &ToolCommand) -> bool {
        match self.position(command).and_then(|idx| self.channels.remove(idx)) {
            Some(channel) => {
                Self::shut_down(channel);
                true
            }
            None => false,
        }
    }

    /// Terminate every pooled process. Calling this on an empty pool is a no-op.
    pub fn terminate_all(&mut self) {
        if !self.channels.is_empty() {
            debug!("Terminating {} pooled processes", self.channels.len());
        }
        while let Some(channel) = self.channels.pop_front() {
            Self::shut_down(channel);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn position(&self, command: &ToolCommand) -> Option<usize> {
        self.channels.iter().position(|c| c.command() == command)
    }

    fn shut_down(mut channel: ToolProcess) {
        if let Err(e) = channel.terminate() {
            warn!("Failed to terminate {}: {e}", channel.command());
        }
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

/// Lock a shared pool, recovering it if a previous holder panicked.
///
/// Teardown must still be able to reach the processes after a panic.
pub fn lock_pool(pool: &SharedPool) -> MutexGuard<'_, ProcessPool> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    impl ProcessPool {
        fn contains(&self, command: &ToolCommand) -> bool {
            self.position(command).is_some()
        }

        /// Most recent first
        fn pids(&self) -> Vec<u32> {
            self.channels.iter().map(ToolProcess::id).collect()
        }
    }

    fn pool(capacity: usize) -> ProcessPool {
        ProcessPool::new(capacity, Duration::from_secs(5), ChildRegistry::new())
    }

    fn cat(tag: usize) -> ToolCommand {
        // Extra arguments after `-c script` only set $0, so each tag is a
        // distinct command running the same script.
        let args = ["-c".to_string(), "cat".to_string(), format!("pool-{tag}")];
        ToolCommand::new("/bin/sh").args(args)
    }

    fn is_running(pid: u32) -> bool {
        Path::new(&format!("/proc/{pid}")).exists()
    }

    #[test]
    fn test_acquire_reuses_process() {
        let mut pool = pool(10);
        let first = pool.acquire(&cat(0)).unwrap().id();
        let second = pool.acquire(&cat(0)).unwrap().id();
        assert_eq!(first, second);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_acquire_moves_to_front() {
        let mut pool = pool(10);
        let a = pool.acquire(&cat(0)).unwrap().id();
        let b = pool.acquire(&cat(1)).unwrap().id();
        assert_eq!(pool.pids(), vec![b, a]);

        pool.acquire(&cat(0)).unwrap();
        assert_eq!(pool.pids(), vec![a, b]);
    }

    #[test]
    fn test_eviction_is_lru_and_bounded() {
        let mut pool = pool(10);
        let mut pids = Vec::new();
        for tag in 0..10 {
            pids.push(pool.acquire(&cat(tag)).unwrap().id());
        }
        assert_eq!(pool.len(), 10);

        // Touch #0 so #1 becomes least recently used
        pool.acquire(&cat(0)).unwrap();
        pool.acquire(&cat(10)).unwrap();

        assert_eq!(pool.len(), 10);
        assert!(pool.contains(&cat(0)));
        assert!(!pool.contains(&cat(1)));
        assert!(pool.contains(&cat(10)));
        assert!(!is_running(pids[1]), "evicted process should be reaped");
        assert!(is_running(pids[0]));
    }

    #[test]
    fn test_terminate_all_twice() {
        let mut pool = pool(3);
        let pid = pool.acquire(&cat(0)).unwrap().id();
        pool.acquire(&cat(1)).unwrap();

        pool.terminate_all();
        pool.terminate_all();
        assert!(pool.is_empty());
        assert!(!is_running(pid));
    }

    #[test]
    fn test_discard() {
        let mut pool = pool(3);
        let pid = pool.acquire(&cat(0)).unwrap().id();
        assert!(pool.discard(&cat(0)));
        assert!(!pool.discard(&cat(0)));
        assert!(!is_running(pid));
    }

    #[test]
    fn test_spawn_failure_leaves_pool_usable() {
        let mut pool = pool(3);
        pool.acquire(&cat(0)).unwrap();
        assert!(pool.acquire(&ToolCommand::new("/nonexistent/tool")).is_err());
        assert_eq!(pool.len(), 1);
        assert!(pool.acquire(&cat(1)).is_ok());
    }
}
