use crate::types::{compute_hash, Hash, ShardId};
use serde::{Deserialize, Serialize};

/// A batch of transactions moving between two shards.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MiniBlock {
    pub sender_shard_id: ShardId,
    pub receiver_shard_id: ShardId,
    pub tx_hashes: Vec<Hash>,
}

impl MiniBlock {
    pub fn hash(&self) -> Result<Hash, serde_json::Error> {
        compute_hash(self)
    }
}

/// Block body: the mini blocks a header commits to, in header order.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Body {
    pub mini_blocks: Vec<MiniBlock>,
}

impl Body {
    pub fn new(mini_blocks: Vec<MiniBlock>) -> Self {
        Self { mini_blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.mini_blocks.is_empty()
    }

    pub fn hashes(&self) -> Result<Vec<Hash>, serde_json::Error> {
        self.mini_blocks.iter().map(MiniBlock::hash).collect()
    }
}
