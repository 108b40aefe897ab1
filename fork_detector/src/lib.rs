//! Fork detection for a single chain.
//!
//! The detector keeps every header observed per nonce together with the
//! trust level it was seen at, tracks checkpoints of locally processed
//! headers, and reports where the local chain diverged from the one the
//! network agreed on. Shard and metachain detectors share this logic and
//! differ only in their [`FinalityPolicy`].
pub mod blacklist;
pub mod checkpoints;
pub mod detector;
pub mod error;
pub mod handler;
pub mod policy;
pub mod store;

pub use blacklist::BlackList;
pub use checkpoints::CheckpointTracker;
pub use detector::{ForkDetector, ForkState, MetaForkDetector, ShardForkDetector};
pub use error::ForkDetectorError;
pub use handler::ForkDetectorHandler;
pub use policy::{FinalityPolicy, MetaFinality, ShardFinality};
pub use store::HeaderStore;
