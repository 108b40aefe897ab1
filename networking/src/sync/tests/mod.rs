mod bootstrapper_tests;
mod rollback_tests;

use chain::{ManualRounder, SyncConfig};
use fork_detector::{
    BlackList, FinalityPolicy, ForkDetector, MetaFinality, MetaForkDetector, ShardFinality,
    ShardForkDetector,
};
use metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;

use crate::memory::{BlockBuilder, GeneratedBlock, MemoryNode};
use crate::sync::{Bootstrapper, ChainRole};

pub const GENESIS_TIME: u64 = 1_000;
pub const ROUND_SECS: u64 = 4;

pub fn test_config() -> SyncConfig {
    SyncConfig {
        genesis_time: GENESIS_TIME,
        wait_time_ms: 50,
        sleep_time_ms: 5,
        ..SyncConfig::default()
    }
}

/// One node syncing against an in-memory network.
pub struct Harness<P: FinalityPolicy> {
    pub builder: BlockBuilder,
    pub genesis: GeneratedBlock,
    pub node: MemoryNode,
    pub detector: Arc<ForkDetector<P>>,
    pub rounder: Arc<ManualRounder>,
    pub black_list: Arc<BlackList>,
    pub metrics: Arc<Metrics>,
    pub bootstrapper: Arc<Bootstrapper>,
}

impl Harness<MetaFinality> {
    pub fn meta(index: i64, config: SyncConfig) -> Self {
        let rounder = rounder(index);
        let black_list = black_list();
        let detector = Arc::new(MetaForkDetector::new(
            rounder.clone(),
            black_list.clone(),
            config.clone(),
        ));
        Self::assemble(ChainRole::Meta, detector, rounder, black_list, config)
    }
}

impl Harness<ShardFinality> {
    pub fn shard(index: i64, config: SyncConfig) -> Self {
        let rounder = rounder(index);
        let black_list = black_list();
        let detector = Arc::new(ShardForkDetector::new(
            rounder.clone(),
            black_list.clone(),
            config.clone(),
        ));
        Self::assemble(ChainRole::Shard(0), detector, rounder, black_list, config)
    }
}

impl<P: FinalityPolicy + 'static> Harness<P> {
    fn assemble(
        role: ChainRole,
        detector: Arc<ForkDetector<P>>,
        rounder: Arc<ManualRounder>,
        black_list: Arc<BlackList>,
        config: SyncConfig,
    ) -> Self {
        let builder = BlockBuilder::new(role, GENESIS_TIME, Duration::from_secs(ROUND_SECS));
        let genesis = builder.genesis().unwrap();
        let node = MemoryNode::new(&genesis, role).unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());

        let bootstrapper = Arc::new(Bootstrapper::new(node.bootstrapper_args(
            config,
            detector.clone(),
            rounder.clone(),
            black_list.clone(),
            metrics.clone(),
        )));

        Self {
            builder,
            genesis,
            node,
            detector,
            rounder,
            black_list,
            metrics,
            bootstrapper,
        }
    }

    /// `count` blocks on top of genesis, known to the network.
    pub fn publish_chain(&self, count: u64) -> Vec<GeneratedBlock> {
        let blocks = self.builder.chain(&self.genesis, count, "main").unwrap();
        self.node.network.insert_blocks(blocks.clone());
        blocks
    }

    /// Deliver `block` through the headers pool and wait until the fork
    /// detector saw it.
    pub async fn receive(&self, block: &GeneratedBlock) {
        self.node.network.insert_block(block.clone());
        self.node.network.broadcast_header(block);

        let nonce = block.nonce();
        let hash = block.hash.clone();
        let detector = self.detector.clone();
        wait_until(move || {
            detector
                .headers_at(nonce)
                .iter()
                .any(|record| record.hash == hash)
        })
        .await;
    }

    pub async fn sync_blocks(&self, count: usize) {
        for _ in 0..count {
            self.bootstrapper.sync_block().await.unwrap();
        }
    }
}

pub fn rounder(index: i64) -> Arc<ManualRounder> {
    Arc::new(ManualRounder::new(index, Duration::from_secs(ROUND_SECS)))
}

pub fn black_list() -> Arc<BlackList> {
    Arc::new(BlackList::new(Duration::from_secs(60)))
}

/// Poll `condition` until it holds. Panics after about two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
