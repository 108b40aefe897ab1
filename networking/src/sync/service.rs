use chain::{RoundProvider, SyncConfig};
use containers::{
    Body, ForkStatus, Hash, Header, HeaderHandler, MetaHeader, MiniBlock, ShardId, TrustState,
    METACHAIN_SHARD_ID,
};
use fork_detector::{BlackList, ForkDetectorHandler};
use metrics::SharedMetrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    counters::SyncFailureCounters,
    error::{HeaderKey, SyncError},
    interfaces::{
        nonce_key, BlockExecutor, ChainHandler, ChainRole, ChainTip, HeadersPool, MiniBlocksPool,
        NetworkWatcher, RequestHandler, StorageUnit, Storer,
    },
    signals::{RequestedHeader, RequiredMiniBlocks, Signal},
    states::NodeState,
    storage::{BootStorage, BootstrapData},
};

/// Collaborators and settings of a [`Bootstrapper`].
pub struct BootstrapperArgs {
    pub role: ChainRole,
    pub config: SyncConfig,
    pub fork_detector: Arc<dyn ForkDetectorHandler>,
    pub round_provider: Arc<dyn RoundProvider>,
    pub black_list: Arc<BlackList>,
    pub headers_pool: Arc<dyn HeadersPool>,
    pub mini_blocks_pool: Arc<dyn MiniBlocksPool>,
    pub request_handler: Arc<dyn RequestHandler>,
    pub executor: Arc<dyn BlockExecutor>,
    pub chain: Arc<dyn ChainHandler>,
    pub storer: Arc<dyn Storer>,
    pub network_watcher: Arc<dyn NetworkWatcher>,
    pub metrics: SharedMetrics,
}

/// Node state as computed for one round.
#[derive(Debug, Clone, Default)]
struct NodeStatus {
    round_index: i64,
    is_calculated: bool,
    is_synchronized: bool,
    fork: ForkStatus,
}

/// Drives one chain towards the block the network agreed on.
///
/// Each step of the sync loop computes the node state, resolves a fork by
/// rolling back when needed, then fetches, executes and commits the next
/// block. Headers and mini blocks arrive through pool subscriptions; the
/// loop waits for the ones it requested on single-slot signals.
pub struct Bootstrapper {
    pub(super) role: ChainRole,
    pub(super) config: SyncConfig,
    pub(super) fork_detector: Arc<dyn ForkDetectorHandler>,
    pub(super) round_provider: Arc<dyn RoundProvider>,
    pub(super) black_list: Arc<BlackList>,
    pub(super) headers_pool: Arc<dyn HeadersPool>,
    pub(super) mini_blocks_pool: Arc<dyn MiniBlocksPool>,
    pub(super) request_handler: Arc<dyn RequestHandler>,
    pub(super) executor: Arc<dyn BlockExecutor>,
    pub(super) chain: Arc<dyn ChainHandler>,
    pub(super) storer: Arc<dyn Storer>,
    pub(super) network_watcher: Arc<dyn NetworkWatcher>,
    pub(super) metrics: SharedMetrics,
    pub(super) boot_storage: BootStorage,

    node_status: Mutex<NodeStatus>,
    sync_state: watch::Sender<NodeState>,
    counters: Mutex<SyncFailureCounters>,

    requested_header: RequestedHeader,
    header_nonce_signal: Signal,
    header_hash_signal: Signal,
    required_mini_blocks: RequiredMiniBlocks,
    mini_blocks_signal: Signal,
    request_headers_lock: Mutex<()>,

    stop_signal: Signal,
    sync_loop: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bootstrapper {
    pub fn new(args: BootstrapperArgs) -> Self {
        let (sync_state, _) = watch::channel(NodeState::NotCalculated);

        Self {
            role: args.role,
            config: args.config,
            fork_detector: args.fork_detector,
            round_provider: args.round_provider,
            black_list: args.black_list,
            headers_pool: args.headers_pool,
            mini_blocks_pool: args.mini_blocks_pool,
            request_handler: args.request_handler,
            executor: args.executor,
            chain: args.chain,
            boot_storage: BootStorage::new(args.storer.clone()),
            storer: args.storer,
            network_watcher: args.network_watcher,
            metrics: args.metrics,
            node_status: Mutex::new(NodeStatus::default()),
            sync_state,
            counters: Mutex::new(SyncFailureCounters::default()),
            requested_header: RequestedHeader::default(),
            header_nonce_signal: Signal::new(),
            header_hash_signal: Signal::new(),
            required_mini_blocks: RequiredMiniBlocks::default(),
            mini_blocks_signal: Signal::new(),
            request_headers_lock: Mutex::new(()),
            stop_signal: Signal::new(),
            sync_loop: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn role(&self) -> ChainRole {
        self.role
    }

    /// Resume from persisted state, then start the sync loop together with
    /// the pool subscriptions and the status logger.
    pub async fn start_sync(self: &Arc<Self>) -> Result<(), SyncError> {
        match self.load_from_storage().await {
            Ok(true) => {}
            Ok(false) => debug!(chain = ?self.role, "No bootstrap data found, syncing from genesis"),
            Err(err) => warn!(chain = ?self.role, error = %err, "Cannot load bootstrap data, syncing from genesis"),
        }

        self.spawn_subscriptions();

        let this = Arc::clone(self);
        let status_logger = tokio::spawn(async move { this.log_status_periodically().await });

        let this = Arc::clone(self);
        let sync_loop = tokio::spawn(async move { this.sync_blocks().await });

        self.tasks.lock().push(status_logger);
        *self.sync_loop.lock() = Some(sync_loop);

        info!(chain = ?self.role, "Sync started");
        Ok(())
    }

    /// Stop the sync loop at its next idle check and wait for it, then end
    /// the subscriptions and the status logger.
    ///
    /// A step in flight, rollbacks included, runs to completion first.
    pub async fn stop_sync(&self) {
        self.stop_signal.notify();

        let sync_loop = self.sync_loop.lock().take();
        if let Some(sync_loop) = sync_loop {
            if let Err(err) = sync_loop.await {
                warn!(chain = ?self.role, error = %err, "Sync loop ended abnormally");
            }
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(chain = ?self.role, "Sync stopped");
    }

    /// Forward pool notifications to the engine. Only needed when driving
    /// [`Bootstrapper::sync_block`] by hand; [`Bootstrapper::start_sync`]
    /// does it too.
    pub fn spawn_subscriptions(self: &Arc<Self>) {
        let mut headers = self.headers_pool.subscribe();
        let this = Arc::clone(self);
        let header_task = tokio::spawn(async move {
            while let Some((header, hash)) = headers.recv().await {
                this.process_received_header(&header, &hash);
            }
        });

        let mut mini_blocks = self.mini_blocks_pool.subscribe();
        let this = Arc::clone(self);
        let mini_block_task = tokio::spawn(async move {
            while let Some(hash) = mini_blocks.recv().await {
                this.received_mini_block(&hash);
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.push(header_task);
        tasks.push(mini_block_task);
    }

    /// State computed for the current round, or `NotCalculated`.
    pub fn node_state(&self) -> NodeState {
        let status = self.node_status.lock();
        let is_calculated_in_current_round =
            status.is_calculated && status.round_index == self.round_provider.index();

        if !is_calculated_in_current_round {
            return NodeState::NotCalculated;
        }

        if status.is_synchronized {
            NodeState::Synchronized
        } else {
            NodeState::NotSynchronized
        }
    }

    /// Every state computed from now on.
    pub fn subscribe_sync_state(&self) -> watch::Receiver<NodeState> {
        self.sync_state.subscribe()
    }

    pub fn failure_counters(&self) -> SyncFailureCounters {
        *self.counters.lock()
    }

    async fn sync_blocks(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.sleep_time()).await;

            if self.stop_signal.try_take() {
                break;
            }

            if !self.network_watcher.is_connected_to_the_network() {
                continue;
            }

            if let Err(err) = self.sync_block().await {
                debug!(chain = ?self.role, error = %err, "SyncBlock");
            }
        }

        info!(chain = ?self.role, "Sync loop ended");
    }

    async fn log_status_periodically(&self) {
        let mut interval = tokio::time::interval(self.config.status_log_interval());

        loop {
            interval.tick().await;
            self.black_list.sweep();
            self.fork_detector.reset_probable_highest_nonce_if_needed();

            let nonce = self.chain.tip().map_or(0, |tip| tip.header.nonce());
            info!(
                chain = ?self.role,
                state = %self.node_state(),
                nonce,
                probable_highest_nonce = self.fork_detector.probable_highest_nonce(),
                final_nonce = self.fork_detector.highest_final_block_nonce(),
                round = self.round_provider.index(),
                "Sync status"
            );
        }
    }

    /// One step of the sync loop.
    ///
    /// Does nothing unless the node is not synchronized. Otherwise resolves
    /// a pending fork, then fetches, executes and commits the next block.
    pub async fn sync_block(self: &Arc<Self>) -> Result<(), SyncError> {
        self.compute_node_state();
        if self.node_state() != NodeState::NotSynchronized {
            return Ok(());
        }

        let result = self.sync_next_block().await;
        self.node_status.lock().is_calculated = false;
        result
    }

    async fn sync_next_block(self: &Arc<Self>) -> Result<(), SyncError> {
        let fork = self.fork_status();

        match &fork {
            ForkStatus::NoFork => {}
            ForkStatus::RollbackOneBlock => {
                self.metrics.inc_fork_choice("rollback_one_block");
                info!(chain = ?self.role, "Roll back one block has been forced");
                self.roll_back_one_block_forced().await;
                return Ok(());
            }
            ForkStatus::RollbackToNonce(nonce) => {
                self.metrics.inc_fork_choice("rollback_to_nonce");
                info!(chain = ?self.role, nonce, "Roll back to nonce has been forced");
                self.roll_back_to_nonce_forced().await;
                return Ok(());
            }
            ForkStatus::ForkAt { nonce, round, hash } => {
                self.metrics.inc_fork_choice("fork_at");
                info!(chain = ?self.role, nonce, round, %hash, "Fork detected");
                self.roll_back(true).await?;
            }
        }

        let mut attempted = None;
        let result = self.sync_next_header(&fork, &mut attempted).await;

        match result {
            Ok(()) => {
                self.counters.lock().reset();
                Ok(())
            }
            Err(err) => {
                self.on_sync_block_failed(attempted.as_ref(), &err).await;
                Err(err)
            }
        }
    }

    async fn sync_next_header(
        self: &Arc<Self>,
        fork: &ForkStatus,
        attempted: &mut Option<Header>,
    ) -> Result<(), SyncError> {
        let (header, hash) = self.next_header_requesting_if_missing(fork).await?;
        *attempted = Some(header.clone());

        let this = Arc::clone(self);
        let from_nonce = header.nonce() + 1;
        tokio::spawn(async move { this.request_headers_from_nonce_if_missing(from_nonce) });

        let body = self.block_body_requesting_if_missing(&header).await?;

        let started = Instant::now();
        self.executor
            .process_block(&header, &body, self.round_provider.time_duration())
            .await?;
        debug!(elapsed = ?started.elapsed(), nonce = header.nonce(), "Elapsed time to process block");

        let commit_started = Instant::now();
        self.executor.commit_block(&header, &hash, &body).await?;
        debug!(elapsed = ?commit_started.elapsed(), nonce = header.nonce(), "Elapsed time to commit block");
        self.metrics
            .observe_block_processing_time(started.elapsed().as_secs_f64());

        if let Err(err) = self
            .fork_detector
            .add_header(&header, &hash, TrustState::Processed, &[])
        {
            debug!(error = %err, nonce = header.nonce(), "Fork detector rejected processed header");
        }

        if let Err(err) = self.save_bootstrap_data(&header, &hash) {
            debug!(error = %err, nonce = header.nonce(), "Cannot save bootstrap data");
        }

        self.metrics.set_current_nonce(header.nonce());
        self.metrics
            .set_final_nonce(self.fork_detector.highest_final_block_nonce());

        info!(
            chain = ?self.role,
            nonce = header.nonce(),
            round = header.round(),
            %hash,
            "Block has been synced successfully"
        );

        Ok(())
    }

    async fn on_sync_block_failed(&self, header: Option<&Header>, err: &SyncError) {
        self.metrics.inc_sync_errors(err.reason());

        let round_index = self.round_provider.index();
        let action = self
            .counters
            .lock()
            .record_failure(err.is_timeout(), round_index, &self.config);

        if action.roll_back {
            if let Some(header) = header {
                if let Some(hash) = self.remove_header_from_pools(header) {
                    self.fork_detector.remove_headers(header.nonce(), &hash);
                }
            }

            if let Err(err) = self.roll_back(false).await {
                debug!(chain = ?self.role, error = %err, "Roll back after failed sync step");
            }
        }

        if action.reset_probable_highest_nonce {
            self.fork_detector.reset_probable_highest_nonce();
            self.remove_headers_with_nonce_from_pool(self.nonce_for_next_block());
        }
    }

    /// Recompute the node state unless it was already computed this round.
    pub(super) fn compute_node_state(self: &Arc<Self>) {
        let round_index = self.round_provider.index();
        let mut status = self.node_status.lock();

        if status.is_calculated && status.round_index == round_index {
            return;
        }

        let fork = self.fork_detector.check_fork();
        let probable_highest_nonce = self.fork_detector.probable_highest_nonce();
        let has_last_block = match self.chain.tip() {
            Some(tip) => probable_highest_nonce <= tip.header.nonce(),
            None => probable_highest_nonce == 0,
        };

        let is_connected = self.network_watcher.is_connected_to_the_network();
        let is_synchronized = !fork.is_detected() && has_last_block && is_connected;

        if is_synchronized != status.is_synchronized {
            debug!(
                chain = ?self.role,
                is_synchronized,
                probable_highest_nonce,
                "Node has changed its synchronized state"
            );
        }

        let should_request_headers = self.should_try_to_request_headers(round_index, &fork, is_synchronized);

        *status = NodeStatus {
            round_index,
            is_calculated: true,
            is_synchronized,
            fork,
        };
        drop(status);

        let node_state = if is_synchronized {
            NodeState::Synchronized
        } else {
            NodeState::NotSynchronized
        };
        self.sync_state.send_replace(node_state);

        self.metrics.set_is_syncing(!is_synchronized);
        self.metrics.set_connected_to_network(is_connected);
        self.metrics.set_probable_highest_nonce(probable_highest_nonce);

        if should_request_headers {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.request_headers_if_sync_is_stuck(round_index) });
        }
    }

    fn should_try_to_request_headers(&self, round_index: i64, fork: &ForkStatus, is_synchronized: bool) -> bool {
        if round_index < 0 || fork.is_forced() {
            return false;
        }

        if !is_synchronized {
            return true;
        }

        let modulus = self.config.round_modulus_trigger_when_sync_is_stuck;
        modulus > 0 && round_index % modulus == 0
    }

    fn request_headers_if_sync_is_stuck(&self, round_index: i64) {
        let last_synced_round = self.chain.tip().map_or(0, |tip| tip.header.round());
        let round_diff = round_index - last_synced_round as i64;
        if round_diff <= self.config.max_rounds_without_new_block_received as i64 {
            return;
        }

        let from_nonce = self.nonce_for_next_block();
        let headers_to_request = self
            .config
            .max_headers_to_request_in_advance
            .min(round_diff as u64 - 1);
        if headers_to_request == 0 {
            return;
        }
        let to_nonce = from_nonce + headers_to_request - 1;

        debug!(
            chain = ?self.role,
            from_nonce,
            to_nonce,
            probable_highest_nonce = self.fork_detector.probable_highest_nonce(),
            "Sync is stuck, requesting headers"
        );

        self.request_headers(from_nonce, to_nonce);
    }

    fn request_headers_from_nonce_if_missing(&self, from_nonce: u64) {
        let probable_highest_nonce = self.fork_detector.probable_highest_nonce();
        let to_nonce = (from_nonce + self.config.max_headers_to_request_in_advance)
            .saturating_sub(1)
            .min(probable_highest_nonce);

        if from_nonce > to_nonce {
            return;
        }

        debug!(
            chain = ?self.role,
            from_nonce,
            to_nonce,
            probable_highest_nonce,
            "Requesting headers in advance"
        );

        self.request_headers(from_nonce, to_nonce);
    }

    fn request_headers(&self, from_nonce: u64, to_nonce: u64) {
        let _guard = self.request_headers_lock.lock();
        let shard_id = self.role.shard_id();

        for nonce in from_nonce..=to_nonce {
            if self.headers_pool.get_by_nonce(nonce, shard_id).is_some() {
                continue;
            }
            self.request_handler.request_header_by_nonce(shard_id, nonce);
        }
    }

    /// Handle a header added to the headers pool.
    pub fn process_received_header(&self, header: &Header, hash: &Hash) {
        if header.shard_id() != self.role.shard_id() {
            if let (ChainRole::Shard(shard_id), Header::Meta(meta)) = (self.role, header) {
                self.process_notarizations(meta, shard_id);
            }
            return;
        }

        trace!(
            chain = ?self.role,
            round = header.round(),
            nonce = header.nonce(),
            %hash,
            "Received header from network"
        );

        if let Err(err) = self
            .fork_detector
            .add_header(header, hash, TrustState::Received, &[])
        {
            debug!(error = %err, nonce = header.nonce(), %hash, "Fork detector rejected received header");
        }

        self.request_mini_blocks_in_advance(header);

        if self.requested_header.take_if_nonce(header.nonce()) {
            debug!(nonce = header.nonce(), %hash, "Received requested header by nonce");
            self.header_nonce_signal.notify();
        }

        if self.requested_header.take_if_hash(hash) {
            debug!(nonce = header.nonce(), %hash, "Received requested header by hash");
            self.header_hash_signal.notify();
        }
    }

    /// Pass the headers of this shard notarized by a metachain block to the
    /// fork detector.
    fn process_notarizations(&self, meta: &MetaHeader, shard_id: ShardId) {
        let mut notarized = Vec::new();

        for data in meta.notarized_for_shard(shard_id) {
            match self.header_by_hash(&data.header_hash) {
                Ok(Some(header)) => notarized.push((header, data.header_hash.clone())),
                Ok(None) => {
                    debug!(nonce = data.nonce, hash = %data.header_hash, "Notarized header is not known yet");
                    self.request_handler
                        .request_header_by_hash(shard_id, &data.header_hash);
                }
                Err(err) => debug!(error = %err, hash = %data.header_hash, "Cannot load notarized header"),
            }
        }

        if !notarized.is_empty() {
            self.fork_detector
                .received_self_notarized_headers(METACHAIN_SHARD_ID, &notarized);
        }
    }

    fn request_mini_blocks_in_advance(&self, header: &Header) {
        let next_nonce = self.nonce_for_next_block();
        let max_nonce = (next_nonce + self.config.max_headers_to_request_in_advance)
            .saturating_sub(1)
            .min(self.fork_detector.probable_highest_nonce());

        if header.nonce() < next_nonce || header.nonce() > max_nonce {
            return;
        }

        let (_, missing) = self.mini_blocks_from_pool(header.mini_block_hashes());
        if !missing.is_empty() {
            trace!(
                nonce = header.nonce(),
                missing = missing.len(),
                "Requesting mini blocks in advance"
            );
            self.request_handler
                .request_mini_blocks(self.role.shard_id(), &missing);
        }
    }

    /// Handle a mini block added to the mini blocks pool.
    pub fn received_mini_block(&self, hash: &Hash) {
        if self.required_mini_blocks.received(hash) {
            debug!(chain = ?self.role, "Received all requested mini blocks");
            self.mini_blocks_signal.notify();
        }
    }

    pub(super) fn fork_status(&self) -> ForkStatus {
        self.node_status.lock().fork.clone()
    }

    pub(super) fn nonce_for_next_block(&self) -> u64 {
        self.chain.tip().map_or(1, |tip| tip.header.nonce() + 1)
    }

    async fn next_header_requesting_if_missing(&self, fork: &ForkStatus) -> Result<(Header, Hash), SyncError> {
        let nonce = self.nonce_for_next_block();
        self.requested_header.clear();

        let hash = self
            .fork_detector
            .notarized_header_hash(nonce)
            .or_else(|| fork.hash().cloned());

        match hash {
            Some(hash) => {
                let header = self.header_with_hash_requesting_if_missing(&hash).await?;
                Ok((header, hash))
            }
            None => self.header_with_nonce_requesting_if_missing(nonce).await,
        }
    }

    async fn header_with_nonce_requesting_if_missing(&self, nonce: u64) -> Result<(Header, Hash), SyncError> {
        let shard_id = self.role.shard_id();
        if let Some(found) = self.headers_pool.get_by_nonce(nonce, shard_id) {
            return Ok(found);
        }

        self.header_nonce_signal.drain();
        self.requested_header.set_nonce(Some(nonce));
        self.request_handler.request_header_by_nonce(shard_id, nonce);
        self.header_nonce_signal.wait(self.config.wait_time()).await?;

        self.headers_pool
            .get_by_nonce(nonce, shard_id)
            .ok_or(SyncError::MissingHeader(HeaderKey::Nonce(nonce)))
    }

    async fn header_with_hash_requesting_if_missing(&self, hash: &Hash) -> Result<Header, SyncError> {
        let header = match self.header_by_hash(hash)? {
            Some(header) => header,
            None => {
                self.header_hash_signal.drain();
                self.requested_header.set_hash(Some(hash.clone()));
                self.request_handler
                    .request_header_by_hash(self.role.shard_id(), hash);
                self.header_hash_signal.wait(self.config.wait_time()).await?;

                self.headers_pool
                    .get_by_hash(hash)
                    .ok_or_else(|| SyncError::MissingHeader(HeaderKey::Hash(hash.clone())))?
            }
        };

        if header.shard_id() != self.role.shard_id() {
            return Err(SyncError::WrongHeaderType);
        }

        Ok(header)
    }

    /// Header from the pool, else from storage.
    pub(super) fn header_by_hash(&self, hash: &Hash) -> Result<Option<Header>, SyncError> {
        if let Some(header) = self.headers_pool.get_by_hash(hash) {
            return Ok(Some(header));
        }

        self.header_from_storage(hash)
    }

    pub(super) fn header_from_storage(&self, hash: &Hash) -> Result<Option<Header>, SyncError> {
        let bytes = self
            .storer
            .get(self.role.header_unit(), hash.as_bytes())
            .map_err(SyncError::Storage)?;

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn block_body_requesting_if_missing(&self, header: &Header) -> Result<Body, SyncError> {
        let hashes = header.mini_block_hashes();
        self.required_mini_blocks.clear();

        let (found, missing) = self.mini_blocks_from_pool(hashes);
        let mut resolved: HashMap<Hash, MiniBlock> = found.into_iter().collect();

        if !missing.is_empty() {
            self.mini_blocks_signal.drain();
            self.required_mini_blocks.set(&missing);
            debug!(nonce = header.nonce(), missing = missing.len(), "Requesting mini blocks from network");
            self.request_handler
                .request_mini_blocks(self.role.shard_id(), &missing);
            self.mini_blocks_signal.wait(self.config.wait_time()).await?;

            let (received, still_missing) = self.mini_blocks_from_pool(&missing);
            if !still_missing.is_empty() {
                return Err(SyncError::MissingBody);
            }
            resolved.extend(received);
        }

        hashes
            .iter()
            .map(|hash| resolved.remove(hash).ok_or(SyncError::MissingBody))
            .collect::<Result<Vec<_>, _>>()
            .map(Body::new)
    }

    /// Mini blocks found in the pool or storage, and the hashes of the
    /// missing ones.
    fn mini_blocks_from_pool(&self, hashes: &[Hash]) -> (Vec<(Hash, MiniBlock)>, Vec<Hash>) {
        let mut found = Vec::with_capacity(hashes.len());
        let mut missing = Vec::new();

        for hash in hashes {
            match self
                .mini_blocks_pool
                .peek(hash)
                .or_else(|| self.mini_block_from_storage(hash))
            {
                Some(mini_block) => found.push((hash.clone(), mini_block)),
                None => missing.push(hash.clone()),
            }
        }

        (found, missing)
    }

    fn mini_block_from_storage(&self, hash: &Hash) -> Option<MiniBlock> {
        let bytes = self
            .storer
            .get(StorageUnit::MiniBlocks, hash.as_bytes())
            .ok()
            .flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Body of a committed block, without asking the network.
    pub(super) fn committed_body(&self, header: &Header) -> Result<Body, SyncError> {
        let (found, missing) = self.mini_blocks_from_pool(header.mini_block_hashes());
        if !missing.is_empty() {
            return Err(SyncError::MissingBody);
        }

        Ok(Body::new(found.into_iter().map(|(_, mini_block)| mini_block).collect()))
    }

    pub(super) fn remove_header_from_pools(&self, header: &Header) -> Option<Hash> {
        let hash = match header.hash() {
            Ok(hash) => hash,
            Err(err) => {
                debug!(error = %err, nonce = header.nonce(), "Cannot hash header");
                return None;
            }
        };

        debug!(
            chain = ?self.role,
            epoch = header.epoch(),
            round = header.round(),
            nonce = header.nonce(),
            %hash,
            "Removing header from pools"
        );
        self.headers_pool.remove_by_hash(&hash);

        Some(hash)
    }

    pub(super) fn remove_headers_with_nonce_from_pool(&self, nonce: u64) {
        debug!(chain = ?self.role, nonce, "Removing headers with nonce from pool");
        self.headers_pool.remove_by_nonce(nonce, self.role.shard_id());
    }

    pub(super) fn remove_nonce_index(&self, nonce: u64) {
        if let Err(err) = self.storer.remove(self.role.nonce_unit(), &nonce_key(nonce)) {
            debug!(error = %err, nonce, "Cannot remove nonce index");
        }
    }

    fn save_bootstrap_data(&self, header: &Header, hash: &Hash) -> Result<(), SyncError> {
        self.boot_storage.put(&BootstrapData {
            epoch: header.epoch(),
            round: header.round(),
            last_header_nonce: header.nonce(),
            last_header_hash: hash.clone(),
            last_checkpoint: self.fork_detector.last_checkpoint(),
            final_checkpoint: self.fork_detector.final_checkpoint(),
        })
    }

    /// Restore the chain tip and checkpoints saved before a restart.
    /// Returns false when there is nothing to restore.
    pub async fn load_from_storage(&self) -> Result<bool, SyncError> {
        if self.chain.tip().is_some() {
            return Ok(false);
        }

        let Some(data) = self.boot_storage.load_latest()? else {
            return Ok(false);
        };

        let header = self
            .header_from_storage(&data.last_header_hash)?
            .ok_or_else(|| SyncError::MissingHeader(HeaderKey::Hash(data.last_header_hash.clone())))?;
        let body = self.committed_body(&header)?;

        self.executor.revert_state_to_block(&header).await?;

        // the tip needs a processed record so competitors at its nonce are seen as forks
        if let Err(err) = self.fork_detector.add_header(
            &header,
            &data.last_header_hash,
            TrustState::Processed,
            &[],
        ) {
            debug!(error = %err, nonce = header.nonce(), "Fork detector rejected restored header");
        }

        self.chain.set_tip(Some(ChainTip {
            header,
            hash: data.last_header_hash.clone(),
            body,
        }));
        self.fork_detector
            .restore_checkpoints(data.last_checkpoint.clone(), data.final_checkpoint.clone());

        info!(
            chain = ?self.role,
            round = data.round,
            nonce = data.last_header_nonce,
            final_nonce = data.final_checkpoint.nonce,
            "Loaded bootstrap data from storage"
        );

        Ok(true)
    }
}
