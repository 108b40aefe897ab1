//! Block synchronization and rollback for one chain of a sharded network,
//! plus in-memory collaborators to run it without a real node.
pub mod memory;
pub mod sync;

pub use sync::{Bootstrapper, BootstrapperArgs, ChainRole, NodeState, SyncError};
