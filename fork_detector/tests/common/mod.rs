//! Shared helpers for fork detector tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chain::{ManualRounder, SyncConfig};
use containers::{Hash, Header, MetaHeader, ShardHeader};
use fork_detector::{BlackList, MetaForkDetector, ShardForkDetector};

pub const GENESIS_TIME: u64 = 1_000;
pub const ROUND_SECS: u64 = 4;

pub fn test_config() -> SyncConfig {
    SyncConfig {
        genesis_time: GENESIS_TIME,
        ..SyncConfig::default()
    }
}

pub fn hash(value: &str) -> Hash {
    Hash::from(value)
}

pub fn shard_header(nonce: u64, round: u64) -> Header {
    Header::Shard(ShardHeader {
        nonce,
        round,
        shard_id: 0,
        timestamp: GENESIS_TIME + round * ROUND_SECS,
        rand_seed: vec![nonce as u8 + 1],
        prev_rand_seed: vec![nonce as u8],
        pub_keys_bitmap: vec![0b0000_0111],
        ..Default::default()
    })
}

pub fn meta_header(nonce: u64, round: u64) -> Header {
    Header::Meta(MetaHeader {
        nonce,
        round,
        timestamp: GENESIS_TIME + round * ROUND_SECS,
        rand_seed: vec![nonce as u8 + 1],
        prev_rand_seed: vec![nonce as u8],
        pub_keys_bitmap: vec![0b0000_0111],
        ..Default::default()
    })
}

pub fn rounder(index: i64) -> Arc<ManualRounder> {
    Arc::new(ManualRounder::new(index, Duration::from_secs(ROUND_SECS)))
}

pub fn black_list() -> Arc<BlackList> {
    Arc::new(BlackList::new(Duration::from_secs(60)))
}

pub fn shard_detector(index: i64) -> (ShardForkDetector, Arc<ManualRounder>) {
    let rounder = rounder(index);
    let detector = ShardForkDetector::new(rounder.clone(), black_list(), test_config());
    (detector, rounder)
}

pub fn meta_detector(index: i64) -> (MetaForkDetector, Arc<ManualRounder>) {
    let rounder = rounder(index);
    let detector = MetaForkDetector::new(rounder.clone(), black_list(), test_config());
    (detector, rounder)
}
