use chain::SyncConfig;
use containers::{Checkpoint, ForkStatus, HeaderHandler, TrustState};
use fork_detector::MetaForkDetector;
use metrics::Metrics;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::{black_list, test_config, wait_until, Harness, GENESIS_TIME, ROUND_SECS};
use crate::memory::{shard_data, BlockBuilder, MemoryNode};
use crate::sync::{BootStorage, Bootstrapper, ChainRole, NodeState};

#[tokio::test]
async fn test_syncs_known_chain_then_reports_synchronized() {
    let h = Harness::meta(10, test_config());
    h.bootstrapper.spawn_subscriptions();

    let blocks = h.publish_chain(3);
    h.receive(&blocks[2]).await;
    assert_eq!(h.detector.probable_highest_nonce(), 3);

    h.sync_blocks(3).await;

    assert_eq!(h.node.chain.tip_hash(), Some(blocks[2].hash.clone()));
    assert_eq!(h.node.executor.executed(), vec![1, 2, 3]);
    assert_eq!(
        h.detector.final_checkpoint(),
        Checkpoint::new(2, 2, blocks[1].hash.clone())
    );

    h.bootstrapper.sync_block().await.unwrap();
    assert_eq!(h.bootstrapper.node_state(), NodeState::Synchronized);
    assert_eq!(h.node.executor.executed(), vec![1, 2, 3]);

    let saved = BootStorage::new(h.node.storer.clone())
        .load_latest()
        .unwrap()
        .unwrap();
    assert_eq!(saved.last_header_nonce, 3);
    assert_eq!(saved.last_header_hash, blocks[2].hash);
    assert_eq!(saved.final_checkpoint.nonce, 2);
}

#[tokio::test]
async fn test_start_sync_reaches_synchronized_state() {
    let h = Harness::meta(10, test_config());
    let blocks = h.publish_chain(5);
    let mut state = h.bootstrapper.subscribe_sync_state();

    h.bootstrapper.start_sync().await.unwrap();
    h.receive(&blocks[4]).await;
    h.rounder.advance(1);

    let chain = h.node.chain.clone();
    wait_until(move || chain.nonce() == 5).await;

    timeout(Duration::from_secs(2), state.wait_for(NodeState::is_synchronized))
        .await
        .expect("node did not synchronize")
        .expect("sync state channel closed");
    assert_eq!(h.bootstrapper.node_state(), NodeState::Synchronized);

    h.bootstrapper.stop_sync().await;
    assert_eq!(h.node.executor.executed(), vec![1, 2, 3, 4, 5]);

    let exported = h.metrics.gather().unwrap();
    assert!(exported.contains("chain_sync_current_nonce 5"));
    assert!(exported.contains("chain_sync_is_syncing 0"));
}

#[tokio::test]
async fn test_disconnected_node_is_not_synchronized() {
    let h = Harness::meta(10, test_config());
    h.node.network.set_connected(false);
    let state = h.bootstrapper.subscribe_sync_state();

    let err = h.bootstrapper.sync_block().await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(*state.borrow(), NodeState::NotSynchronized);
    assert_eq!(h.node.network.requested_nonces(), vec![1]);

    let exported = h.metrics.gather().unwrap();
    assert!(exported.contains("chain_sync_connected_to_network 0"));
    assert!(exported.contains("chain_sync_errors_total{reason=\"timeout\"} 1"));
}

#[tokio::test]
async fn test_headers_of_other_chains_are_ignored() {
    let h = Harness::meta(10, test_config());
    let shard_builder = BlockBuilder::new(
        ChainRole::Shard(1),
        GENESIS_TIME,
        Duration::from_secs(ROUND_SECS),
    );
    let shard_genesis = shard_builder.genesis().unwrap();
    let shard_block = shard_builder.next(&shard_genesis, 1, "shard").unwrap();

    h.bootstrapper
        .process_received_header(&shard_block.header, &shard_block.hash);

    assert!(h.detector.headers_at(1).is_empty());
    assert_eq!(h.detector.probable_highest_nonce(), 0);
}

#[tokio::test]
async fn test_mini_blocks_are_requested_within_run_ahead_window() {
    let config = SyncConfig {
        max_headers_to_request_in_advance: 2,
        ..test_config()
    };
    let h = Harness::meta(10, config);
    let blocks = h.publish_chain(3);

    for block in &blocks {
        h.bootstrapper
            .process_received_header(&block.header, &block.hash);
    }

    let mini_block = |index: usize| blocks[index].header.mini_block_hashes()[0].clone();
    assert!(h.node.mini_blocks_pool.contains(&mini_block(0)));
    assert!(h.node.mini_blocks_pool.contains(&mini_block(1)));
    assert!(!h.node.mini_blocks_pool.contains(&mini_block(2)));
}

#[tokio::test]
async fn test_meta_header_notarizations_reach_shard_detector() {
    let h = Harness::shard(10, test_config());
    let meta_builder = BlockBuilder::new(ChainRole::Meta, GENESIS_TIME, Duration::from_secs(ROUND_SECS));
    let meta_genesis = meta_builder.genesis().unwrap();

    let known = h.builder.next(&h.genesis, 1, "main").unwrap();
    let unknown = h.builder.next(&known, 2, "main").unwrap();
    h.node.network.broadcast_header(&known);
    h.node.network.insert_block(unknown.clone());

    let meta = meta_builder
        .next_notarizing(&meta_genesis, 3, "meta", vec![shard_data(&known), shard_data(&unknown)])
        .unwrap();
    h.bootstrapper.process_received_header(&meta.header, &meta.hash);

    assert_eq!(h.detector.notarized_header_hash(1), Some(known.hash.clone()));
    assert_eq!(h.detector.notarized_header_hash(2), None);
    assert_eq!(h.node.network.requested_hashes(), vec![unknown.hash.clone()]);
    assert!(h.node.headers_pool.contains(&unknown.hash));
    assert_eq!(h.detector.probable_highest_nonce(), 1);
}

#[tokio::test]
async fn test_restart_resumes_from_saved_bootstrap_data() {
    let h = Harness::meta(10, test_config());
    h.bootstrapper.spawn_subscriptions();
    let blocks = h.publish_chain(3);
    h.receive(&blocks[2]).await;
    h.sync_blocks(3).await;

    let restarted = MemoryNode::with_storer(&h.genesis, ChainRole::Meta, h.node.storer.clone()).unwrap();
    let detector = Arc::new(MetaForkDetector::new(
        h.rounder.clone(),
        black_list(),
        test_config(),
    ));
    let bootstrapper = Bootstrapper::new(restarted.bootstrapper_args(
        test_config(),
        detector.clone(),
        h.rounder.clone(),
        black_list(),
        Arc::new(Metrics::new().unwrap()),
    ));

    assert!(bootstrapper.load_from_storage().await.unwrap());

    assert_eq!(restarted.chain.tip_hash(), Some(blocks[2].hash.clone()));
    assert_eq!(&restarted.executor.state_root(), blocks[2].header.root_hash());
    assert_eq!(
        detector.last_checkpoint(),
        Checkpoint::new(3, 3, blocks[2].hash.clone())
    );
    assert_eq!(
        detector.final_checkpoint(),
        Checkpoint::new(2, 2, blocks[1].hash.clone())
    );

    // headers at or below the restored final nonce are stale
    assert!(detector
        .add_header(&blocks[1].header, &blocks[1].hash, TrustState::Received, &[])
        .is_err());

    assert!(!bootstrapper.load_from_storage().await.unwrap());

    // a same-round header with a lower hash beats the restored tip
    let rival = (0..)
        .map(|i| h.builder.next(&blocks[1], 3, &format!("rival{i}")).unwrap())
        .find(|block| block.hash < blocks[2].hash)
        .unwrap();
    detector
        .add_header(&rival.header, &rival.hash, TrustState::Received, &[])
        .unwrap();

    assert_eq!(
        detector.check_fork(),
        ForkStatus::ForkAt {
            nonce: 3,
            round: 3,
            hash: rival.hash.clone(),
        }
    );
}
