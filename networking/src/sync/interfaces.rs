use async_trait::async_trait;
use containers::{Body, Hash, Header, MiniBlock, ShardId, METACHAIN_SHARD_ID};
use std::time::Duration;
use tokio::sync::mpsc;

/// Which chain a node synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainRole {
    Shard(ShardId),
    Meta,
}

impl ChainRole {
    pub fn shard_id(&self) -> ShardId {
        match self {
            ChainRole::Shard(shard_id) => *shard_id,
            ChainRole::Meta => METACHAIN_SHARD_ID,
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, ChainRole::Meta)
    }

    /// Unit holding headers of this chain, keyed by hash.
    pub fn header_unit(&self) -> StorageUnit {
        match self {
            ChainRole::Shard(_) => StorageUnit::BlockHeaders,
            ChainRole::Meta => StorageUnit::MetaBlocks,
        }
    }

    /// Unit mapping nonces of this chain to header hashes.
    pub fn nonce_unit(&self) -> StorageUnit {
        match self {
            ChainRole::Shard(shard_id) => StorageUnit::ShardNonceHash(*shard_id),
            ChainRole::Meta => StorageUnit::MetaNonceHash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageUnit {
    BlockHeaders,
    MetaBlocks,
    ShardNonceHash(ShardId),
    MetaNonceHash,
    MiniBlocks,
    Bootstrap,
}

/// Key of the nonce to hash index.
pub fn nonce_key(nonce: u64) -> [u8; 8] {
    nonce.to_be_bytes()
}

/// Headers received from the network and not yet discarded.
pub trait HeadersPool: Send + Sync {
    fn add(&self, hash: Hash, header: Header);
    fn get_by_hash(&self, hash: &Hash) -> Option<Header>;
    fn get_by_nonce(&self, nonce: u64, shard_id: ShardId) -> Option<(Header, Hash)>;
    fn remove_by_hash(&self, hash: &Hash);
    fn remove_by_nonce(&self, nonce: u64, shard_id: ShardId);
    /// Every header added from now on is sent on the returned channel.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<(Header, Hash)>;
}

pub trait MiniBlocksPool: Send + Sync {
    fn add(&self, hash: Hash, mini_block: MiniBlock);
    fn peek(&self, hash: &Hash) -> Option<MiniBlock>;
    fn remove(&self, hash: &Hash);
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Hash>;
}

/// Fire and forget requests to peers. Answers land in the pools.
pub trait RequestHandler: Send + Sync {
    fn request_header_by_nonce(&self, shard_id: ShardId, nonce: u64);
    fn request_header_by_hash(&self, shard_id: ShardId, hash: &Hash);
    fn request_mini_blocks(&self, shard_id: ShardId, hashes: &[Hash]);
}

/// Executes blocks against the node's state.
#[async_trait]
pub trait BlockExecutor: Send + Sync {
    /// Execute a block. Must finish within `deadline`.
    async fn process_block(&self, header: &Header, body: &Body, deadline: Duration) -> anyhow::Result<()>;

    /// Persist a processed block and make it the chain tip.
    async fn commit_block(&self, header: &Header, hash: &Hash, body: &Body) -> anyhow::Result<()>;

    async fn revert_state_to_block(&self, header: &Header) -> anyhow::Result<()>;

    async fn prune_state_on_rollback(&self, current: &Header, previous: &Header);

    /// Put the body of a rolled back block back into the pools.
    async fn restore_block_into_pools(&self, header: &Header, body: &Body) -> anyhow::Result<()>;
}

/// A committed block at the head of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub header: Header,
    pub hash: Hash,
    pub body: Body,
}

pub trait ChainHandler: Send + Sync {
    fn genesis_hash(&self) -> Hash;
    /// None while only the genesis block is known.
    fn tip(&self) -> Option<ChainTip>;
    fn set_tip(&self, tip: Option<ChainTip>);
}

pub trait Storer: Send + Sync {
    fn get(&self, unit: StorageUnit, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;
    fn put(&self, unit: StorageUnit, key: &[u8], value: Vec<u8>) -> anyhow::Result<()>;
    fn remove(&self, unit: StorageUnit, key: &[u8]) -> anyhow::Result<()>;
}

pub trait NetworkWatcher: Send + Sync {
    fn is_connected_to_the_network(&self) -> bool;
}
