/// Block synchronization for one chain of a sharded network.
///
/// This module keeps a node's chain in step with the chain the network
/// agreed on. It includes:
///
/// - **Interfaces**: Pools, request handler, executor, chain handler and
///   storage the engine drives
/// - **Signals**: Single-slot wake ups between pool subscriptions and the loop
/// - **Failure Counters**: Retry policy after failed sync steps
/// - **Boot Storage**: Persisted state to resume after a restart
/// - **Bootstrapper**: The sync loop and its state machine
/// - **Rollback**: Unwinding committed blocks on forks
///
/// ## Sync Step
///
/// 1. Compute the node state for the current round (at most once per round)
/// 2. If a fork is detected, roll back (one block, to a nonce, or to the fork)
/// 3. Fetch the next header by notarized hash, fork hash or nonce
/// 4. Fetch its body, requesting missing mini blocks
/// 5. Execute and commit the block, then persist the bootstrap record
///
/// ## State Machine
///
/// - **NOT CALCULATED**: Not computed yet in the current round
/// - **NOT SYNCHRONIZED**: Behind the network, on a fork or disconnected
/// - **SYNCHRONIZED**: Holding the highest known block with no fork
pub mod config;
pub mod counters;
pub mod error;
pub mod interfaces;
mod rollback;
pub mod service;
pub mod signals;
pub mod states;
pub mod storage;

pub use config::*;
pub use counters::{FailureAction, SyncFailureCounters};
pub use error::{HeaderKey, SyncError};
pub use interfaces::{
    nonce_key, BlockExecutor, ChainHandler, ChainRole, ChainTip, HeadersPool, MiniBlocksPool,
    NetworkWatcher, RequestHandler, StorageUnit, Storer,
};
pub use service::{Bootstrapper, BootstrapperArgs};
pub use states::NodeState;
pub use storage::{BootStorage, BootstrapData};

#[cfg(test)]
mod tests;
