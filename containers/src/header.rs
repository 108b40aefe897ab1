use crate::types::{compute_hash, Hash, ShardId, METACHAIN_SHARD_ID};
use serde::{Deserialize, Serialize};

/// Capabilities shared by shard and metachain headers.
///
/// Fork detection and synchronization only ever look at a header through
/// this trait, so both chains run the same code paths.
pub trait HeaderHandler {
    fn nonce(&self) -> u64;
    fn round(&self) -> u64;
    fn epoch(&self) -> u32;
    fn shard_id(&self) -> ShardId;
    fn timestamp(&self) -> u64;
    fn prev_hash(&self) -> &Hash;
    fn rand_seed(&self) -> &[u8];
    fn prev_rand_seed(&self) -> &[u8];
    fn pub_keys_bitmap(&self) -> &[u8];
    fn root_hash(&self) -> &Hash;
    fn mini_block_hashes(&self) -> &[Hash];

    /// A header built on a proposal carries both its own and its parent's seed.
    fn has_random_seeds(&self) -> bool {
        !self.rand_seed().is_empty() && !self.prev_rand_seed().is_empty()
    }

    /// True when at least one validator signed the header.
    fn is_signed(&self) -> bool {
        self.pub_keys_bitmap().iter().any(|byte| *byte != 0)
    }
}

/// Header of a block produced by a regular shard.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardHeader {
    pub nonce: u64,
    pub round: u64,
    pub epoch: u32,
    pub shard_id: ShardId,
    pub timestamp: u64,
    pub prev_hash: Hash,
    pub rand_seed: Vec<u8>,
    pub prev_rand_seed: Vec<u8>,
    pub pub_keys_bitmap: Vec<u8>,
    pub root_hash: Hash,
    pub mini_block_hashes: Vec<Hash>,
}

/// Reference to a shard header notarized inside a metachain block.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardData {
    pub shard_id: ShardId,
    pub header_hash: Hash,
    pub nonce: u64,
    pub round: u64,
}

/// Header of a metachain block.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaHeader {
    pub nonce: u64,
    pub round: u64,
    pub epoch: u32,
    pub timestamp: u64,
    pub prev_hash: Hash,
    pub rand_seed: Vec<u8>,
    pub prev_rand_seed: Vec<u8>,
    pub pub_keys_bitmap: Vec<u8>,
    pub root_hash: Hash,
    pub mini_block_hashes: Vec<Hash>,
    pub shard_info: Vec<ShardData>,
}

impl MetaHeader {
    /// Shard headers of `shard_id` notarized by this metachain block.
    pub fn notarized_for_shard(&self, shard_id: ShardId) -> impl Iterator<Item = &ShardData> {
        self.shard_info
            .iter()
            .filter(move |data| data.shard_id == shard_id)
    }
}

/// A header of either chain kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Header {
    Shard(ShardHeader),
    Meta(MetaHeader),
}

impl Header {
    pub fn hash(&self) -> Result<Hash, serde_json::Error> {
        compute_hash(self)
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Header::Meta(_))
    }

    pub fn as_shard(&self) -> Option<&ShardHeader> {
        match self {
            Header::Shard(header) => Some(header),
            Header::Meta(_) => None,
        }
    }

    pub fn as_meta(&self) -> Option<&MetaHeader> {
        match self {
            Header::Meta(header) => Some(header),
            Header::Shard(_) => None,
        }
    }
}

impl From<ShardHeader> for Header {
    fn from(header: ShardHeader) -> Self {
        Header::Shard(header)
    }
}

impl From<MetaHeader> for Header {
    fn from(header: MetaHeader) -> Self {
        Header::Meta(header)
    }
}

impl HeaderHandler for ShardHeader {
    fn nonce(&self) -> u64 {
        self.nonce
    }
    fn round(&self) -> u64 {
        self.round
    }
    fn epoch(&self) -> u32 {
        self.epoch
    }
    fn shard_id(&self) -> ShardId {
        self.shard_id
    }
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
    fn prev_hash(&self) -> &Hash {
        &self.prev_hash
    }
    fn rand_seed(&self) -> &[u8] {
        &self.rand_seed
    }
    fn prev_rand_seed(&self) -> &[u8] {
        &self.prev_rand_seed
    }
    fn pub_keys_bitmap(&self) -> &[u8] {
        &self.pub_keys_bitmap
    }
    fn root_hash(&self) -> &Hash {
        &self.root_hash
    }
    fn mini_block_hashes(&self) -> &[Hash] {
        &self.mini_block_hashes
    }
}

impl HeaderHandler for MetaHeader {
    fn nonce(&self) -> u64 {
        self.nonce
    }
    fn round(&self) -> u64 {
        self.round
    }
    fn epoch(&self) -> u32 {
        self.epoch
    }
    fn shard_id(&self) -> ShardId {
        METACHAIN_SHARD_ID
    }
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
    fn prev_hash(&self) -> &Hash {
        &self.prev_hash
    }
    fn rand_seed(&self) -> &[u8] {
        &self.rand_seed
    }
    fn prev_rand_seed(&self) -> &[u8] {
        &self.prev_rand_seed
    }
    fn pub_keys_bitmap(&self) -> &[u8] {
        &self.pub_keys_bitmap
    }
    fn root_hash(&self) -> &Hash {
        &self.root_hash
    }
    fn mini_block_hashes(&self) -> &[Hash] {
        &self.mini_block_hashes
    }
}

impl Header {
    fn inner(&self) -> &dyn HeaderHandler {
        match self {
            Header::Shard(header) => header,
            Header::Meta(header) => header,
        }
    }
}

impl HeaderHandler for Header {
    fn nonce(&self) -> u64 {
        self.inner().nonce()
    }
    fn round(&self) -> u64 {
        self.inner().round()
    }
    fn epoch(&self) -> u32 {
        self.inner().epoch()
    }
    fn shard_id(&self) -> ShardId {
        self.inner().shard_id()
    }
    fn timestamp(&self) -> u64 {
        self.inner().timestamp()
    }
    fn prev_hash(&self) -> &Hash {
        self.inner().prev_hash()
    }
    fn rand_seed(&self) -> &[u8] {
        self.inner().rand_seed()
    }
    fn prev_rand_seed(&self) -> &[u8] {
        self.inner().prev_rand_seed()
    }
    fn pub_keys_bitmap(&self) -> &[u8] {
        self.inner().pub_keys_bitmap()
    }
    fn root_hash(&self) -> &Hash {
        self.inner().root_hash()
    }
    fn mini_block_hashes(&self) -> &[Hash] {
        self.inner().mini_block_hashes()
    }
}
