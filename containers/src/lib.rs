pub mod block;
pub mod checkpoint;
pub mod fork;
pub mod header;
pub mod record;
pub mod types;

pub use block::{Body, MiniBlock};
pub use checkpoint::Checkpoint;
pub use fork::ForkStatus;
pub use header::{Header, HeaderHandler, MetaHeader, ShardData, ShardHeader};
pub use record::{HeaderRecord, TrustState};
pub use types::{compute_hash, Hash, ShardId, METACHAIN_SHARD_ID};
