use chain::SyncConfig;
use containers::{Checkpoint, HeaderHandler, TrustState};
use fork_detector::ForkDetectorError;
use pretty_assertions::assert_eq;
use std::time::Duration;

use super::{test_config, wait_until, Harness, GENESIS_TIME, ROUND_SECS};
use crate::memory::{shard_data, BlockBuilder};
use crate::sync::{ChainRole, SyncError, SyncFailureCounters};

#[tokio::test]
async fn test_forced_fork_rolls_back_one_block() {
    let h = Harness::meta(1, test_config());
    let block = h.builder.next(&h.genesis, 1, "main").unwrap();
    h.node.network.insert_block(block.clone());
    h.node.network.broadcast_header(&block);
    h.bootstrapper.process_received_header(&block.header, &block.hash);
    h.sync_blocks(1).await;
    assert_eq!(h.node.chain.nonce(), 1);

    // consensus keeps proposing on top of block 1 without committing
    h.rounder.set_index(15);
    let proposed = h.builder.next(&block, 15, "main").unwrap();
    h.detector
        .add_header(&proposed.header, &proposed.hash, TrustState::Proposed, &[])
        .unwrap();
    assert!(h.detector.should_force_fork());

    h.bootstrapper.sync_block().await.unwrap();

    assert_eq!(h.node.chain.tip_hash(), None);
    assert!(!h.detector.should_force_fork());
    assert!(h.detector.headers_at(2).is_empty());
    assert_eq!(h.detector.checkpoints(), vec![Checkpoint::genesis()]);
    assert_eq!(&h.node.executor.state_root(), h.genesis.header.root_hash());
    assert!(!h.node.headers_pool.contains(&block.hash));
    assert!(h
        .node
        .mini_blocks_pool
        .contains(&block.header.mini_block_hashes()[0]));
}

#[tokio::test]
async fn test_repeated_timeouts_roll_back_in_proper_round() {
    let config = SyncConfig {
        wait_time_ms: 20,
        ..test_config()
    };
    let h = Harness::meta(10, config);
    let blocks = h.builder.chain(&h.genesis, 3, "main").unwrap();

    // the network never delivers block 3
    h.node.network.insert_blocks(blocks[..2].to_vec());
    for block in &blocks[..2] {
        h.node.network.broadcast_header(block);
    }
    for block in &blocks {
        h.bootstrapper
            .process_received_header(&block.header, &block.hash);
    }
    assert_eq!(h.detector.probable_highest_nonce(), 3);

    h.sync_blocks(2).await;
    assert_eq!(h.node.chain.nonce(), 2);

    for _ in 0..4 {
        let err = h.bootstrapper.sync_block().await.unwrap_err();
        assert!(matches!(err, SyncError::TimeIsOut));
        assert_eq!(h.node.chain.nonce(), 2);
    }

    let err = h.bootstrapper.sync_block().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(h.node.chain.tip_hash(), Some(blocks[0].hash.clone()));
    assert_eq!(
        h.bootstrapper.failure_counters(),
        SyncFailureCounters {
            sync_with_errors: 5,
            requests_with_timeout: 5,
        }
    );
    assert!(!h.node.headers_pool.contains(&blocks[1].hash));
    assert!(h
        .metrics
        .gather()
        .unwrap()
        .contains("chain_sync_rollbacks_total 1"));
}

#[tokio::test]
async fn test_roll_back_to_nonce_then_replay_restores_state() {
    let h = Harness::meta(10, test_config());
    h.bootstrapper.spawn_subscriptions();
    let blocks = h.publish_chain(3);
    h.receive(&blocks[2]).await;
    h.sync_blocks(3).await;

    let checkpoints = h.detector.checkpoints();
    let final_checkpoint = h.detector.final_checkpoint();
    let records = h.detector.headers_at(3);
    let state_root = h.node.executor.state_root();

    h.detector.set_roll_back_nonce(3);
    h.bootstrapper.sync_block().await.unwrap();

    assert_eq!(h.node.chain.tip_hash(), Some(blocks[1].hash.clone()));
    assert_eq!(&h.node.executor.state_root(), blocks[1].header.root_hash());
    assert!(h.detector.headers_at(3).is_empty());
    assert_eq!(h.detector.probable_highest_nonce(), 2);

    h.receive(&blocks[2]).await;
    h.sync_blocks(1).await;

    assert_eq!(h.node.chain.tip_hash(), Some(blocks[2].hash.clone()));
    assert_eq!(h.detector.checkpoints(), checkpoints);
    assert_eq!(h.detector.final_checkpoint(), final_checkpoint);
    assert_eq!(h.detector.headers_at(3), records);
    assert_eq!(h.node.executor.state_root(), state_root);
    assert_eq!(h.node.executor.executed(), vec![1, 2, 3, 3]);
}

#[tokio::test]
async fn test_fork_switches_to_lower_round_competitor() {
    let h = Harness::shard(5, test_config());
    h.bootstrapper.spawn_subscriptions();

    let first = h.builder.next(&h.genesis, 1, "a").unwrap();
    let ours = h.builder.next(&first, 3, "a").unwrap();
    let theirs = h.builder.next(&first, 2, "c").unwrap();

    h.receive(&first).await;
    h.receive(&ours).await;
    h.sync_blocks(2).await;
    assert_eq!(h.node.chain.tip_hash(), Some(ours.hash.clone()));

    h.receive(&theirs).await;
    h.bootstrapper.sync_block().await.unwrap();

    assert_eq!(h.node.chain.tip_hash(), Some(theirs.hash.clone()));
    assert_eq!(h.node.executor.executed(), vec![1, 2, 2]);
    assert!(!h.node.headers_pool.contains(&ours.hash));
    assert!(!h.black_list.has(&ours.hash));
    assert_eq!(h.detector.last_checkpoint(), Checkpoint::new(2, 2, theirs.hash.clone()));
}

#[tokio::test]
async fn test_metachain_notarization_overrides_processed_header() {
    let h = Harness::shard(10, test_config());
    h.bootstrapper.spawn_subscriptions();

    let first = h.builder.next(&h.genesis, 1, "a").unwrap();
    let ours = h.builder.next(&first, 2, "a").unwrap();
    let notarized = h.builder.next(&first, 3, "b").unwrap();

    h.receive(&first).await;
    h.receive(&ours).await;
    h.sync_blocks(2).await;
    h.receive(&notarized).await;

    let meta_builder = BlockBuilder::new(ChainRole::Meta, GENESIS_TIME, Duration::from_secs(ROUND_SECS));
    let meta_genesis = meta_builder.genesis().unwrap();
    let meta = meta_builder
        .next_notarizing(&meta_genesis, 4, "meta", vec![shard_data(&notarized)])
        .unwrap();
    h.bootstrapper.process_received_header(&meta.header, &meta.hash);
    assert_eq!(h.detector.notarized_header_hash(2), Some(notarized.hash.clone()));

    h.bootstrapper.sync_block().await.unwrap();

    assert_eq!(h.node.chain.tip_hash(), Some(notarized.hash.clone()));
    assert!(h.black_list.has(&ours.hash));
    assert_eq!(
        h.detector.final_checkpoint(),
        Checkpoint::new(2, 3, notarized.hash.clone())
    );
    assert_eq!(
        h.detector
            .add_header(&ours.header, &ours.hash, TrustState::Received, &[]),
        Err(ForkDetectorError::HeaderIsBlackListed(ours.hash.clone()))
    );
}

#[tokio::test]
async fn test_roll_back_stops_at_final_block() {
    let h = Harness::meta(10, test_config());
    h.bootstrapper.spawn_subscriptions();
    let blocks = h.publish_chain(2);
    h.receive(&blocks[1]).await;
    h.sync_blocks(2).await;
    assert_eq!(h.detector.highest_final_block_nonce(), 1);

    h.bootstrapper.roll_back(false).await.unwrap();
    assert_eq!(h.node.chain.tip_hash(), Some(blocks[0].hash.clone()));

    let err = h.bootstrapper.roll_back(false).await.unwrap_err();
    assert!(matches!(err, SyncError::RollBackBehindFinalHeader));
    assert_eq!(h.node.chain.tip_hash(), Some(blocks[0].hash.clone()));
}

#[tokio::test]
async fn test_roll_back_without_chain_tip_fails() {
    let h = Harness::meta(10, test_config());

    let err = h.bootstrapper.roll_back(false).await.unwrap_err();
    assert!(matches!(err, SyncError::NilBlockHeader));
}

#[tokio::test]
async fn test_stop_waits_for_rollback_in_flight() {
    let h = Harness::meta(10, test_config());
    let blocks = h.publish_chain(3);

    h.bootstrapper.start_sync().await.unwrap();
    h.receive(&blocks[2]).await;
    h.rounder.advance(1);

    let chain = h.node.chain.clone();
    wait_until(move || chain.nonce() == 3).await;

    h.node.executor.set_revert_delay(Duration::from_millis(200));
    h.detector.set_roll_back_nonce(3);
    h.rounder.advance(1);

    // the tip moves before the state is reverted
    let chain = h.node.chain.clone();
    let previous = blocks[1].hash.clone();
    wait_until(move || chain.tip_hash() == Some(previous.clone())).await;

    h.bootstrapper.stop_sync().await;

    assert_eq!(h.node.chain.tip_hash(), Some(blocks[1].hash.clone()));
    assert_eq!(&h.node.executor.state_root(), blocks[1].header.root_hash());
    assert!(h.detector.headers_at(3).is_empty());
}
