//! In-memory collaborators of the sync engine.
//!
//! They back the demo binary and the tests: a headers pool and a mini blocks
//! pool with subscriptions, a key value storer, a chain handler, a simulated
//! network serving a pre-built chain, and a block executor that checks block
//! linkage and tracks a state root.
use anyhow::{anyhow, ensure};
use async_trait::async_trait;
use chain::{RoundProvider, SyncConfig};
use containers::{
    compute_hash, Body, Hash, Header, HeaderHandler, MetaHeader, MiniBlock, ShardData, ShardHeader,
    ShardId,
};
use fork_detector::{BlackList, ForkDetectorHandler};
use metrics::SharedMetrics;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::sync::{
    nonce_key, BlockExecutor, BootstrapperArgs, ChainHandler, ChainRole, ChainTip, HeadersPool,
    MiniBlocksPool, NetworkWatcher, RequestHandler, StorageUnit, Storer,
};

/// A block with its header hash, as produced by [`BlockBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBlock {
    pub header: Header,
    pub hash: Hash,
    pub body: Body,
}

impl GeneratedBlock {
    pub fn nonce(&self) -> u64 {
        self.header.nonce()
    }

    pub fn round(&self) -> u64 {
        self.header.round()
    }

    pub fn mini_blocks(&self) -> impl Iterator<Item = (&Hash, &MiniBlock)> {
        self.header
            .mini_block_hashes()
            .iter()
            .zip(self.body.mini_blocks.iter())
    }
}

/// Builds signed blocks of one chain whose timestamps agree with the round
/// clock.
#[derive(Debug, Clone, Copy)]
pub struct BlockBuilder {
    pub role: ChainRole,
    pub genesis_time: u64,
    pub round_duration: Duration,
}

impl BlockBuilder {
    pub fn new(role: ChainRole, genesis_time: u64, round_duration: Duration) -> Self {
        Self {
            role,
            genesis_time,
            round_duration,
        }
    }

    pub fn genesis(&self) -> serde_json::Result<GeneratedBlock> {
        let fields = HeaderFields {
            nonce: 0,
            round: 0,
            timestamp: self.genesis_time,
            prev_hash: Hash::default(),
            rand_seed: b"genesis".to_vec(),
            prev_rand_seed: b"genesis".to_vec(),
            root_hash: compute_hash(&("genesis", self.role.shard_id()))?,
            mini_block_hashes: Vec::new(),
        };

        self.finish(fields, Body::default(), Vec::new())
    }

    /// Child of `parent` proposed in `round`. Blocks built with different
    /// tags at the same nonce compete with each other.
    pub fn next(&self, parent: &GeneratedBlock, round: u64, tag: &str) -> serde_json::Result<GeneratedBlock> {
        self.next_notarizing(parent, round, tag, Vec::new())
    }

    /// Like [`BlockBuilder::next`], for metachain blocks notarizing shard
    /// headers.
    pub fn next_notarizing(
        &self,
        parent: &GeneratedBlock,
        round: u64,
        tag: &str,
        shard_info: Vec<ShardData>,
    ) -> serde_json::Result<GeneratedBlock> {
        let nonce = parent.nonce() + 1;
        let mini_block = MiniBlock {
            sender_shard_id: self.role.shard_id(),
            receiver_shard_id: self.role.shard_id(),
            tx_hashes: vec![Hash::from(format!("{tag}/tx/{nonce}").as_str())],
        };
        let body = Body::new(vec![mini_block]);

        let fields = HeaderFields {
            nonce,
            round,
            timestamp: self.genesis_time + round * self.round_duration.as_secs(),
            prev_hash: parent.hash.clone(),
            rand_seed: format!("{tag}/seed/{nonce}").into_bytes(),
            prev_rand_seed: parent.header.rand_seed().to_vec(),
            root_hash: compute_hash(&(tag, nonce, round))?,
            mini_block_hashes: body.hashes()?,
        };

        self.finish(fields, body, shard_info)
    }

    /// `count` consecutive blocks on top of `parent`, one per round.
    pub fn chain(&self, parent: &GeneratedBlock, count: u64, tag: &str) -> serde_json::Result<Vec<GeneratedBlock>> {
        let mut blocks: Vec<GeneratedBlock> = Vec::new();

        for _ in 0..count {
            let last = blocks.last().unwrap_or(parent);
            let block = self.next(last, last.round() + 1, tag)?;
            blocks.push(block);
        }

        Ok(blocks)
    }

    fn finish(&self, fields: HeaderFields, body: Body, shard_info: Vec<ShardData>) -> serde_json::Result<GeneratedBlock> {
        let header = match self.role {
            ChainRole::Shard(shard_id) => Header::Shard(ShardHeader {
                nonce: fields.nonce,
                round: fields.round,
                epoch: 0,
                shard_id,
                timestamp: fields.timestamp,
                prev_hash: fields.prev_hash,
                rand_seed: fields.rand_seed,
                prev_rand_seed: fields.prev_rand_seed,
                pub_keys_bitmap: vec![0b0000_0111],
                root_hash: fields.root_hash,
                mini_block_hashes: fields.mini_block_hashes,
            }),
            ChainRole::Meta => Header::Meta(MetaHeader {
                nonce: fields.nonce,
                round: fields.round,
                epoch: 0,
                timestamp: fields.timestamp,
                prev_hash: fields.prev_hash,
                rand_seed: fields.rand_seed,
                prev_rand_seed: fields.prev_rand_seed,
                pub_keys_bitmap: vec![0b0000_0111],
                root_hash: fields.root_hash,
                mini_block_hashes: fields.mini_block_hashes,
                shard_info,
            }),
        };

        let hash = header.hash()?;
        Ok(GeneratedBlock { header, hash, body })
    }
}

struct HeaderFields {
    nonce: u64,
    round: u64,
    timestamp: u64,
    prev_hash: Hash,
    rand_seed: Vec<u8>,
    prev_rand_seed: Vec<u8>,
    root_hash: Hash,
    mini_block_hashes: Vec<Hash>,
}

/// Reference to a shard block, for embedding into a metachain header.
pub fn shard_data(block: &GeneratedBlock) -> ShardData {
    ShardData {
        shard_id: block.header.shard_id(),
        header_hash: block.hash.clone(),
        nonce: block.nonce(),
        round: block.round(),
    }
}

#[derive(Default)]
pub struct MemoryHeadersPool {
    headers: RwLock<HashMap<Hash, Header>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<(Header, Hash)>>>,
}

impl MemoryHeadersPool {
    pub fn len(&self) -> usize {
        self.headers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.read().is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.headers.read().contains_key(hash)
    }
}

impl HeadersPool for MemoryHeadersPool {
    fn add(&self, hash: Hash, header: Header) {
        if self.headers.write().insert(hash.clone(), header.clone()).is_some() {
            return;
        }

        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send((header.clone(), hash.clone())).is_ok());
    }

    fn get_by_hash(&self, hash: &Hash) -> Option<Header> {
        self.headers.read().get(hash).cloned()
    }

    /// Lowest hash wins when several headers share the nonce.
    fn get_by_nonce(&self, nonce: u64, shard_id: ShardId) -> Option<(Header, Hash)> {
        self.headers
            .read()
            .iter()
            .filter(|(_, header)| header.nonce() == nonce && header.shard_id() == shard_id)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(hash, header)| (header.clone(), hash.clone()))
    }

    fn remove_by_hash(&self, hash: &Hash) {
        self.headers.write().remove(hash);
    }

    fn remove_by_nonce(&self, nonce: u64, shard_id: ShardId) {
        self.headers
            .write()
            .retain(|_, header| header.nonce() != nonce || header.shard_id() != shard_id);
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<(Header, Hash)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }
}

#[derive(Default)]
pub struct MemoryMiniBlocksPool {
    mini_blocks: RwLock<HashMap<Hash, MiniBlock>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Hash>>>,
}

impl MemoryMiniBlocksPool {
    pub fn contains(&self, hash: &Hash) -> bool {
        self.mini_blocks.read().contains_key(hash)
    }
}

impl MiniBlocksPool for MemoryMiniBlocksPool {
    fn add(&self, hash: Hash, mini_block: MiniBlock) {
        if self.mini_blocks.write().insert(hash.clone(), mini_block).is_some() {
            return;
        }

        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(hash.clone()).is_ok());
    }

    fn peek(&self, hash: &Hash) -> Option<MiniBlock> {
        self.mini_blocks.read().get(hash).cloned()
    }

    fn remove(&self, hash: &Hash) {
        self.mini_blocks.write().remove(hash);
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Hash> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }
}

#[derive(Default)]
pub struct MemoryStorer {
    entries: RwLock<HashMap<(StorageUnit, Vec<u8>), Vec<u8>>>,
}

impl MemoryStorer {
    pub fn len(&self, unit: StorageUnit) -> usize {
        self.entries
            .read()
            .keys()
            .filter(|(entry_unit, _)| *entry_unit == unit)
            .count()
    }
}

impl Storer for MemoryStorer {
    fn get(&self, unit: StorageUnit, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(&(unit, key.to_vec())).cloned())
    }

    fn put(&self, unit: StorageUnit, key: &[u8], value: Vec<u8>) -> anyhow::Result<()> {
        self.entries.write().insert((unit, key.to_vec()), value);
        Ok(())
    }

    fn remove(&self, unit: StorageUnit, key: &[u8]) -> anyhow::Result<()> {
        self.entries.write().remove(&(unit, key.to_vec()));
        Ok(())
    }
}

pub struct MemoryChain {
    genesis_hash: Hash,
    tip: RwLock<Option<ChainTip>>,
}

impl MemoryChain {
    pub fn new(genesis_hash: Hash) -> Self {
        Self {
            genesis_hash,
            tip: RwLock::new(None),
        }
    }

    pub fn nonce(&self) -> u64 {
        self.tip.read().as_ref().map_or(0, |tip| tip.header.nonce())
    }

    pub fn tip_hash(&self) -> Option<Hash> {
        self.tip.read().as_ref().map(|tip| tip.hash.clone())
    }
}

impl ChainHandler for MemoryChain {
    fn genesis_hash(&self) -> Hash {
        self.genesis_hash.clone()
    }

    fn tip(&self) -> Option<ChainTip> {
        self.tip.read().clone()
    }

    fn set_tip(&self, tip: Option<ChainTip>) {
        *self.tip.write() = tip;
    }
}

/// Peers that answer every request from a fixed set of blocks.
///
/// Answers are delivered straight into the local pools, which then notify
/// their subscribers as if the data came from the wire.
pub struct MemoryNetwork {
    headers_pool: Arc<MemoryHeadersPool>,
    mini_blocks_pool: Arc<MemoryMiniBlocksPool>,
    blocks: RwLock<HashMap<Hash, GeneratedBlock>>,
    connected: AtomicBool,
    requested_nonces: Mutex<Vec<u64>>,
    requested_hashes: Mutex<Vec<Hash>>,
}

impl MemoryNetwork {
    pub fn new(headers_pool: Arc<MemoryHeadersPool>, mini_blocks_pool: Arc<MemoryMiniBlocksPool>) -> Self {
        Self {
            headers_pool,
            mini_blocks_pool,
            blocks: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            requested_nonces: Mutex::new(Vec::new()),
            requested_hashes: Mutex::new(Vec::new()),
        }
    }

    /// Make `block` available to requests.
    pub fn insert_block(&self, block: GeneratedBlock) {
        self.blocks.write().insert(block.hash.clone(), block);
    }

    pub fn insert_blocks(&self, blocks: impl IntoIterator<Item = GeneratedBlock>) {
        for block in blocks {
            self.insert_block(block);
        }
    }

    /// Deliver a header as if a peer broadcast it.
    pub fn broadcast_header(&self, block: &GeneratedBlock) {
        self.headers_pool.add(block.hash.clone(), block.header.clone());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn requested_nonces(&self) -> Vec<u64> {
        self.requested_nonces.lock().clone()
    }

    pub fn requested_hashes(&self) -> Vec<Hash> {
        self.requested_hashes.lock().clone()
    }
}

impl RequestHandler for MemoryNetwork {
    fn request_header_by_nonce(&self, shard_id: ShardId, nonce: u64) {
        trace!(shard_id, nonce, "Requesting header by nonce");
        self.requested_nonces.lock().push(nonce);

        let found: Vec<GeneratedBlock> = self
            .blocks
            .read()
            .values()
            .filter(|block| block.nonce() == nonce && block.header.shard_id() == shard_id)
            .cloned()
            .collect();

        for block in found {
            self.broadcast_header(&block);
        }
    }

    fn request_header_by_hash(&self, shard_id: ShardId, hash: &Hash) {
        trace!(shard_id, %hash, "Requesting header by hash");
        self.requested_hashes.lock().push(hash.clone());

        let found = self.blocks.read().get(hash).cloned();
        if let Some(block) = found {
            self.broadcast_header(&block);
        }
    }

    fn request_mini_blocks(&self, shard_id: ShardId, hashes: &[Hash]) {
        trace!(shard_id, count = hashes.len(), "Requesting mini blocks");

        let found: Vec<(Hash, MiniBlock)> = {
            let blocks = self.blocks.read();
            hashes
                .iter()
                .filter_map(|wanted| {
                    blocks.values().find_map(|block| {
                        block
                            .mini_blocks()
                            .find(|(hash, _)| *hash == wanted)
                            .map(|(hash, mini_block)| (hash.clone(), mini_block.clone()))
                    })
                })
                .collect()
        };

        for (hash, mini_block) in found {
            self.mini_blocks_pool.add(hash, mini_block);
        }
    }
}

impl NetworkWatcher for MemoryNetwork {
    fn is_connected_to_the_network(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Executes blocks by checking their linkage, and tracks the root hash of
/// the last executed block as the node's state.
pub struct MemoryExecutor {
    role: ChainRole,
    chain: Arc<MemoryChain>,
    storer: Arc<MemoryStorer>,
    mini_blocks_pool: Arc<MemoryMiniBlocksPool>,
    state_root: Mutex<Hash>,
    executed: Mutex<Vec<u64>>,
    revert_delay: Mutex<Duration>,
}

impl MemoryExecutor {
    pub fn new(
        role: ChainRole,
        chain: Arc<MemoryChain>,
        storer: Arc<MemoryStorer>,
        mini_blocks_pool: Arc<MemoryMiniBlocksPool>,
        genesis_root: Hash,
    ) -> Self {
        Self {
            role,
            chain,
            storer,
            mini_blocks_pool,
            state_root: Mutex::new(genesis_root),
            executed: Mutex::new(Vec::new()),
            revert_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn state_root(&self) -> Hash {
        self.state_root.lock().clone()
    }

    /// Nonces of every executed block, in order.
    pub fn executed(&self) -> Vec<u64> {
        self.executed.lock().clone()
    }

    /// Make every state revert take `delay`, as a slow trie would.
    pub fn set_revert_delay(&self, delay: Duration) {
        *self.revert_delay.lock() = delay;
    }
}

#[async_trait]
impl BlockExecutor for MemoryExecutor {
    async fn process_block(&self, header: &Header, body: &Body, deadline: Duration) -> anyhow::Result<()> {
        ensure!(!deadline.is_zero(), "no time left to process block {}", header.nonce());
        ensure!(header.shard_id() == self.role.shard_id(), "header of another chain");

        let (parent_hash, parent_nonce) = match self.chain.tip() {
            Some(tip) => (tip.hash, tip.header.nonce()),
            None => (self.chain.genesis_hash(), 0),
        };

        ensure!(
            header.prev_hash() == &parent_hash,
            "block {} does not extend the chain tip {}",
            header.nonce(),
            parent_hash
        );
        ensure!(
            header.nonce() == parent_nonce + 1,
            "expected nonce {}, got {}",
            parent_nonce + 1,
            header.nonce()
        );
        ensure!(
            body.hashes()? == header.mini_block_hashes(),
            "body of block {} does not match its header",
            header.nonce()
        );

        self.executed.lock().push(header.nonce());
        Ok(())
    }

    async fn commit_block(&self, header: &Header, hash: &Hash, body: &Body) -> anyhow::Result<()> {
        self.storer.put(
            self.role.header_unit(),
            hash.as_bytes(),
            serde_json::to_vec(header)?,
        )?;
        self.storer.put(
            self.role.nonce_unit(),
            &nonce_key(header.nonce()),
            hash.as_bytes().to_vec(),
        )?;

        for (mini_block_hash, mini_block) in header.mini_block_hashes().iter().zip(&body.mini_blocks) {
            self.storer.put(
                StorageUnit::MiniBlocks,
                mini_block_hash.as_bytes(),
                serde_json::to_vec(mini_block)?,
            )?;
            self.mini_blocks_pool.remove(mini_block_hash);
        }

        *self.state_root.lock() = header.root_hash().clone();
        self.chain.set_tip(Some(ChainTip {
            header: header.clone(),
            hash: hash.clone(),
            body: body.clone(),
        }));

        Ok(())
    }

    async fn revert_state_to_block(&self, header: &Header) -> anyhow::Result<()> {
        if header.root_hash().is_empty() {
            return Err(anyhow!("block {} has no state root", header.nonce()));
        }

        let delay = *self.revert_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        *self.state_root.lock() = header.root_hash().clone();
        Ok(())
    }

    async fn prune_state_on_rollback(&self, current: &Header, previous: &Header) {
        debug!(
            current_nonce = current.nonce(),
            previous_nonce = previous.nonce(),
            "Pruning state of rolled back block"
        );
    }

    async fn restore_block_into_pools(&self, header: &Header, body: &Body) -> anyhow::Result<()> {
        for (hash, mini_block) in header.mini_block_hashes().iter().zip(&body.mini_blocks) {
            self.mini_blocks_pool.add(hash.clone(), mini_block.clone());
        }

        Ok(())
    }
}

/// Every in-memory collaborator of one node.
pub struct MemoryNode {
    pub role: ChainRole,
    pub headers_pool: Arc<MemoryHeadersPool>,
    pub mini_blocks_pool: Arc<MemoryMiniBlocksPool>,
    pub network: Arc<MemoryNetwork>,
    pub chain: Arc<MemoryChain>,
    pub storer: Arc<MemoryStorer>,
    pub executor: Arc<MemoryExecutor>,
}

impl MemoryNode {
    pub fn new(genesis: &GeneratedBlock, role: ChainRole) -> anyhow::Result<Self> {
        Self::with_storer(genesis, role, Arc::new(MemoryStorer::default()))
    }

    /// A node with fresh pools and chain on top of existing storage, as
    /// after a restart.
    pub fn with_storer(genesis: &GeneratedBlock, role: ChainRole, storer: Arc<MemoryStorer>) -> anyhow::Result<Self> {
        storer.put(
            role.header_unit(),
            genesis.hash.as_bytes(),
            serde_json::to_vec(&genesis.header)?,
        )?;

        let headers_pool = Arc::new(MemoryHeadersPool::default());
        let mini_blocks_pool = Arc::new(MemoryMiniBlocksPool::default());
        let network = Arc::new(MemoryNetwork::new(headers_pool.clone(), mini_blocks_pool.clone()));
        let chain = Arc::new(MemoryChain::new(genesis.hash.clone()));
        let executor = Arc::new(MemoryExecutor::new(
            role,
            chain.clone(),
            storer.clone(),
            mini_blocks_pool.clone(),
            genesis.header.root_hash().clone(),
        ));

        Ok(Self {
            role,
            headers_pool,
            mini_blocks_pool,
            network,
            chain,
            storer,
            executor,
        })
    }

    pub fn bootstrapper_args(
        &self,
        config: SyncConfig,
        fork_detector: Arc<dyn ForkDetectorHandler>,
        round_provider: Arc<dyn RoundProvider>,
        black_list: Arc<BlackList>,
        metrics: SharedMetrics,
    ) -> BootstrapperArgs {
        BootstrapperArgs {
            role: self.role,
            config,
            fork_detector,
            round_provider,
            black_list,
            headers_pool: self.headers_pool.clone(),
            mini_blocks_pool: self.mini_blocks_pool.clone(),
            request_handler: self.network.clone(),
            executor: self.executor.clone(),
            chain: self.chain.clone(),
            storer: self.storer.clone(),
            network_watcher: self.network.clone(),
            metrics,
        }
    }
}
