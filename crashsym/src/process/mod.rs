//! External tool process management
//!
//! - `channel`: one spawned tool with a timeout-bounded line reader
//! - `pool`: LRU-bounded set of long-lived tool processes
//! - `registry`: every live tool pid, for teardown that cannot take a pool lock

pub mod channel;
pub mod pool;
pub mod registry;

pub use channel::{ToolCommand, ToolProcess};
pub use pool::{lock_pool, ProcessPool, SharedPool};
pub use registry::ChildRegistry;
