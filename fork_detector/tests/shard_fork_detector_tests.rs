mod common;

use common::*;
use containers::{Checkpoint, ForkStatus, TrustState, METACHAIN_SHARD_ID};
use pretty_assertions::assert_eq;

fn process(detector: &fork_detector::ShardForkDetector, nonce: u64) {
    detector
        .add_header(
            &shard_header(nonce, nonce),
            &hash(&format!("h{nonce}")),
            TrustState::Processed,
            &[],
        )
        .unwrap();
}

#[test]
fn test_processed_headers_are_not_final_without_notarization() {
    let (detector, _) = shard_detector(20);

    for nonce in 1..=4 {
        process(&detector, nonce);
    }

    assert_eq!(detector.highest_final_block_nonce(), 0);
    assert_eq!(detector.last_checkpoint(), Checkpoint::new(4, 4, hash("h4")));
}

#[test]
fn test_metachain_notarization_finalizes_matching_header() {
    let (detector, _) = shard_detector(20);
    for nonce in 1..=3 {
        process(&detector, nonce);
    }

    detector.received_self_notarized_headers(
        METACHAIN_SHARD_ID,
        &[(shard_header(2, 2), hash("h2"))],
    );

    assert_eq!(detector.final_checkpoint(), Checkpoint::new(2, 2, hash("h2")));
    assert_eq!(detector.notarized_header_hash(2), Some(hash("h2")));
    assert_eq!(detector.check_fork(), ForkStatus::NoFork);
}

#[test]
fn test_notarization_from_another_shard_is_ignored() {
    let (detector, _) = shard_detector(20);
    process(&detector, 1);

    detector.received_self_notarized_headers(1, &[(shard_header(1, 1), hash("h1"))]);

    assert_eq!(detector.highest_final_block_nonce(), 0);
    assert_eq!(detector.notarized_header_hash(1), None);
}

#[test]
fn test_notarized_hash_mismatch_is_a_fork_triggered_by_meta() {
    let (detector, _) = shard_detector(20);
    process(&detector, 1);

    detector.received_self_notarized_headers(
        METACHAIN_SHARD_ID,
        &[(shard_header(1, 1), hash("n1"))],
    );

    assert_eq!(detector.highest_final_block_nonce(), 0);
    assert_eq!(
        detector.check_fork(),
        ForkStatus::ForkAt {
            nonce: 1,
            round: 0,
            hash: hash("n1"),
        }
    );
}

#[test]
fn test_self_notarized_headers_passed_with_processed_header() {
    let (detector, _) = shard_detector(20);
    process(&detector, 1);

    detector
        .add_header(
            &shard_header(2, 2),
            &hash("h2"),
            TrustState::Processed,
            &[(shard_header(1, 1), hash("h1"))],
        )
        .unwrap();

    assert_eq!(detector.final_checkpoint(), Checkpoint::new(1, 1, hash("h1")));
    assert_eq!(
        detector.checkpoints(),
        vec![
            Checkpoint::new(1, 1, hash("h1")),
            Checkpoint::new(2, 2, hash("h2")),
        ]
    );
}

#[test]
fn test_final_checkpoint_takes_highest_matching_notarization() {
    let (detector, _) = shard_detector(20);
    for nonce in 1..=4 {
        process(&detector, nonce);
    }

    detector.received_self_notarized_headers(
        METACHAIN_SHARD_ID,
        &[
            (shard_header(1, 1), hash("h1")),
            (shard_header(2, 2), hash("h2")),
            (shard_header(3, 3), hash("h3")),
        ],
    );

    assert_eq!(detector.highest_final_block_nonce(), 3);
    assert_eq!(detector.probable_highest_nonce(), 4);
}

#[test]
fn test_notarized_headers_raise_probable_highest_nonce() {
    let (detector, _) = shard_detector(20);
    process(&detector, 1);

    detector.received_self_notarized_headers(
        METACHAIN_SHARD_ID,
        &[(shard_header(6, 8), hash("n6"))],
    );

    assert_eq!(detector.probable_highest_nonce(), 6);
    assert_eq!(detector.highest_final_block_nonce(), 0);
}

#[test]
fn test_repeated_notarization_changes_nothing() {
    let (detector, _) = shard_detector(20);
    process(&detector, 1);
    process(&detector, 2);

    let notarized = [(shard_header(1, 1), hash("h1"))];
    detector.received_self_notarized_headers(METACHAIN_SHARD_ID, &notarized);
    let before = (detector.final_checkpoint(), detector.headers_at(1));

    detector.received_self_notarized_headers(METACHAIN_SHARD_ID, &notarized);

    assert_eq!((detector.final_checkpoint(), detector.headers_at(1)), before);
}
