use chain::{RoundProvider, SyncConfig};
use containers::{
    Checkpoint, ForkStatus, Hash, Header, HeaderHandler, HeaderRecord, ShardId, TrustState,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    blacklist::BlackList,
    checkpoints::CheckpointTracker,
    error::ForkDetectorError,
    policy::{FinalityPolicy, MetaFinality, ShardFinality},
    store::HeaderStore,
};

/// Fork bookkeeping of one chain.
#[derive(Debug, Clone, Default)]
pub struct ForkState {
    pub checkpoints: CheckpointTracker,
    /// Estimate of the network's highest nonce. Never below the final
    /// checkpoint nonce.
    pub probable_highest_nonce: u64,
    pub last_block_round: u64,
    pub should_force_fork: bool,
    pub roll_back_nonce: Option<u64>,
}

/// Decides which header sequence of one chain is canonical.
///
/// Lock order is `fork` before `headers`.
pub struct ForkDetector<P: FinalityPolicy> {
    round_provider: Arc<dyn RoundProvider>,
    black_list: Arc<BlackList>,
    config: SyncConfig,
    headers: RwLock<HeaderStore>,
    fork: RwLock<ForkState>,
    policy: P,
}

pub type ShardForkDetector = ForkDetector<ShardFinality>;
pub type MetaForkDetector = ForkDetector<MetaFinality>;

impl ShardForkDetector {
    pub fn new(
        round_provider: Arc<dyn RoundProvider>,
        black_list: Arc<BlackList>,
        config: SyncConfig,
    ) -> Self {
        Self::with_policy(ShardFinality::new(), round_provider, black_list, config)
    }
}

impl MetaForkDetector {
    pub fn new(
        round_provider: Arc<dyn RoundProvider>,
        black_list: Arc<BlackList>,
        config: SyncConfig,
    ) -> Self {
        Self::with_policy(MetaFinality, round_provider, black_list, config)
    }
}

impl<P: FinalityPolicy> ForkDetector<P> {
    pub fn with_policy(
        policy: P,
        round_provider: Arc<dyn RoundProvider>,
        black_list: Arc<BlackList>,
        config: SyncConfig,
    ) -> Self {
        Self {
            round_provider,
            black_list,
            config,
            headers: RwLock::new(HeaderStore::new()),
            fork: RwLock::new(ForkState::default()),
            policy,
        }
    }

    /// Record an observation of `header` at the given trust level.
    ///
    /// Processed headers advance the checkpoints according to the chain's
    /// finality policy. `self_notarized` carries headers of this chain that
    /// the parent chain notarized, when known.
    pub fn add_header(
        &self,
        header: &Header,
        hash: &Hash,
        state: TrustState,
        self_notarized: &[(Header, Hash)],
    ) -> Result<(), ForkDetectorError> {
        let mut fork = self.fork.write();

        self.check_block_basic_validity(header, hash, state, fork.checkpoints.final_checkpoint())?;
        self.activate_forced_fork_if_needed(header, state, &mut fork);

        let mut headers = self.headers.write();
        headers.append(HeaderRecord::new(
            header.nonce(),
            header.round(),
            hash.clone(),
            state,
        ));

        if state == TrustState::Processed {
            self.policy.on_processed(
                header,
                hash,
                self_notarized,
                &mut headers,
                &mut fork.checkpoints,
            );
            Self::remove_past_or_invalid_records(&mut headers, &mut fork.checkpoints);
            self.policy
                .prune_below(fork.checkpoints.final_checkpoint().nonce);
        }

        let final_nonce = fork.checkpoints.final_checkpoint().nonce;
        fork.probable_highest_nonce = headers.probable_highest_nonce(final_nonce);

        if !self.is_header_received_too_late(header, state) {
            fork.last_block_round = self.round_provider.index().max(0) as u64;
        }

        debug!(
            chain = self.policy.name(),
            state = ?state,
            round = header.round(),
            nonce = header.nonce(),
            hash = %hash,
            probable_highest_nonce = fork.probable_highest_nonce,
            final_nonce,
            "Added header to fork detector"
        );

        Ok(())
    }

    /// Headers of this chain notarized asynchronously by the parent chain.
    pub fn received_self_notarized_headers(
        &self,
        notarizer: ShardId,
        self_notarized: &[(Header, Hash)],
    ) {
        let mut fork = self.fork.write();
        let mut headers = self.headers.write();

        let appended =
            self.policy
                .on_self_notarized(notarizer, self_notarized, &mut headers, &mut fork.checkpoints);
        if appended {
            let final_nonce = fork.checkpoints.final_checkpoint().nonce;
            fork.probable_highest_nonce = headers.probable_highest_nonce(final_nonce);
        }
    }

    /// Current fork status. A forced single-block rollback wins over a
    /// pending roll back nonce, which wins over a fork found in the records.
    /// The roll back nonce is consumed by this call.
    pub fn check_fork(&self) -> ForkStatus {
        let mut fork = self.fork.write();

        if fork.should_force_fork {
            return ForkStatus::RollbackOneBlock;
        }

        if let Some(nonce) = fork.roll_back_nonce.take() {
            return ForkStatus::RollbackToNonce(nonce);
        }

        let mut headers = self.headers.write();
        match find_lowest_fork(&mut headers) {
            Some(candidate) => ForkStatus::ForkAt {
                nonce: candidate.nonce,
                round: candidate.round,
                hash: candidate.hash,
            },
            None => ForkStatus::NoFork,
        }
    }

    pub fn probable_highest_nonce(&self) -> u64 {
        self.fork.read().probable_highest_nonce
    }

    pub fn highest_final_block_nonce(&self) -> u64 {
        self.fork.read().checkpoints.final_checkpoint().nonce
    }

    /// Fall back to the last checkpoint when nothing new arrived for too
    /// many rounds, so a few bogus high-nonce headers cannot stall sync.
    pub fn reset_probable_highest_nonce_if_needed(&self) {
        let mut fork = self.fork.write();

        let rounds_without_received_block =
            self.round_provider.index() - fork.last_block_round as i64;
        if rounds_without_received_block <= self.config.max_rounds_to_wait {
            return;
        }

        let checkpoint_nonce = fork.checkpoints.last().nonce;
        if fork.probable_highest_nonce > checkpoint_nonce {
            debug!(
                chain = self.policy.name(),
                probable_highest_nonce = fork.probable_highest_nonce,
                checkpoint_nonce,
                "Resetting probable highest nonce to last checkpoint"
            );
            fork.probable_highest_nonce = checkpoint_nonce;
        }
    }

    /// Forget unconfirmed headers above the last checkpoint and recompute
    /// the probable highest nonce.
    pub fn reset_probable_highest_nonce(&self) {
        let mut fork = self.fork.write();
        self.cleanup_unconfirmed_headers(&mut fork);
    }

    /// Clear a forced fork along with the unconfirmed headers that led to it.
    pub fn reset_fork(&self) {
        let mut fork = self.fork.write();
        self.cleanup_unconfirmed_headers(&mut fork);
        fork.should_force_fork = false;

        debug!(
            chain = self.policy.name(),
            probable_highest_nonce = fork.probable_highest_nonce,
            "Fork has been reset"
        );
    }

    /// Drop the record `hash` at `nonce` and the checkpoint at that nonce.
    pub fn remove_headers(&self, nonce: u64, hash: &Hash) {
        let mut fork = self.fork.write();
        fork.checkpoints.remove_with_nonce(nonce);
        self.headers.write().remove(nonce, hash);
    }

    /// Ask the sync loop to unwind the chain down to `nonce`.
    pub fn set_roll_back_nonce(&self, nonce: u64) {
        info!(chain = self.policy.name(), nonce, "Roll back to nonce requested");
        self.fork.write().roll_back_nonce = Some(nonce);
    }

    pub fn notarized_header_hash(&self, nonce: u64) -> Option<Hash> {
        self.policy.notarized_header_hash(nonce)
    }

    /// Seed checkpoints from persisted state after a restart.
    pub fn restore_checkpoints(&self, last: Checkpoint, final_checkpoint: Checkpoint) {
        let mut fork = self.fork.write();
        let headers = self.headers.read();

        fork.checkpoints = CheckpointTracker::restored(last, final_checkpoint);
        let final_nonce = fork.checkpoints.final_checkpoint().nonce;
        fork.probable_highest_nonce = headers.probable_highest_nonce(final_nonce);
    }

    pub fn last_checkpoint(&self) -> Checkpoint {
        self.fork.read().checkpoints.last()
    }

    pub fn final_checkpoint(&self) -> Checkpoint {
        self.fork.read().checkpoints.final_checkpoint().clone()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.fork.read().checkpoints.all().to_vec()
    }

    pub fn should_force_fork(&self) -> bool {
        self.fork.read().should_force_fork
    }

    pub fn headers_at(&self, nonce: u64) -> Vec<HeaderRecord> {
        self.headers.read().at(nonce).to_vec()
    }

    /// A non-processed header is late when it arrives after its round
    /// plus `block_finality` rounds.
    pub fn is_header_received_too_late(&self, header: &Header, state: TrustState) -> bool {
        if state == TrustState::Processed {
            return false;
        }

        (header.round() as i64) < self.round_provider.index() - self.config.block_finality as i64
    }

    fn check_block_basic_validity(
        &self,
        header: &Header,
        hash: &Hash,
        state: TrustState,
        final_checkpoint: &Checkpoint,
    ) -> Result<(), ForkDetectorError> {
        if hash.is_empty() {
            return Err(ForkDetectorError::EmptyHash);
        }
        if self.black_list.has(hash) {
            return Err(ForkDetectorError::HeaderIsBlackListed(hash.clone()));
        }

        self.check_genesis_time(header)?;

        let round_dif = header.round() as i64 - final_checkpoint.round as i64;
        let nonce_dif = header.nonce() as i64 - final_checkpoint.nonce as i64;
        let next_round = self.round_provider.index() + 1;

        if round_dif <= 0 {
            return Err(ForkDetectorError::LowerRoundInBlock {
                round: header.round(),
                final_round: final_checkpoint.round,
            });
        }
        if nonce_dif <= 0 {
            return Err(ForkDetectorError::LowerNonceInBlock {
                nonce: header.nonce(),
                final_nonce: final_checkpoint.nonce,
            });
        }
        if header.round() as i64 > next_round {
            return Err(ForkDetectorError::HigherRoundInBlock {
                round: header.round(),
                next_round,
            });
        }
        if round_dif < nonce_dif {
            return Err(ForkDetectorError::HigherNonceInBlock {
                round_dif,
                nonce_dif,
            });
        }

        match state {
            TrustState::Proposed if !header.has_random_seeds() => {
                Err(ForkDetectorError::RandomSeedNotValid)
            }
            TrustState::Received | TrustState::Processed if !header.is_signed() => {
                Err(ForkDetectorError::BlockIsNotSigned)
            }
            _ => Ok(()),
        }
    }

    fn check_genesis_time(&self, header: &Header) -> Result<(), ForkDetectorError> {
        let round_duration_secs = self.round_provider.time_duration().as_secs() as i64;
        let implied = header.timestamp() as i64 - header.round() as i64 * round_duration_secs;

        if implied != self.config.genesis_time as i64 {
            return Err(ForkDetectorError::GenesisTimeMismatch {
                implied,
                expected: self.config.genesis_time,
            });
        }

        Ok(())
    }

    /// Force a single-block rollback when consensus keeps proposing on top
    /// of a block that has not been followed by a commit for too long.
    fn activate_forced_fork_if_needed(&self, header: &Header, state: TrustState, fork: &mut ForkState) {
        if state != TrustState::Proposed {
            return;
        }

        let last_checkpoint = fork.checkpoints.last();
        let is_syncing = fork.probable_highest_nonce > last_checkpoint.nonce;
        if is_syncing {
            return;
        }

        let rounds_without_committed_block = header.round() as i64 - last_checkpoint.round as i64;
        let nonce_gap = header.nonce() as i64 - last_checkpoint.nonce as i64;
        let round_index = self.round_provider.index();

        let should_force_fork = rounds_without_committed_block
            > self.config.max_rounds_without_committed_block as i64
            && nonce_gap <= 1
            && self.config.is_in_proper_round(round_index);

        if should_force_fork {
            info!(
                chain = self.policy.name(),
                round = header.round(),
                nonce = header.nonce(),
                last_checkpoint_round = last_checkpoint.round,
                last_checkpoint_nonce = last_checkpoint.nonce,
                "Forced fork activated"
            );
            fork.should_force_fork = true;
        }
    }

    fn cleanup_unconfirmed_headers(&self, fork: &mut ForkState) {
        let mut headers = self.headers.write();
        headers.remove_unconfirmed_above(fork.checkpoints.last().nonce);

        let final_nonce = fork.checkpoints.final_checkpoint().nonce;
        fork.probable_highest_nonce = headers.probable_highest_nonce(final_nonce);
    }

    fn remove_past_or_invalid_records(headers: &mut HeaderStore, checkpoints: &mut CheckpointTracker) {
        let final_checkpoint = checkpoints.final_checkpoint().clone();
        headers.remove_below(final_checkpoint.nonce);
        headers.remove_invalid_received(&final_checkpoint);
        checkpoints.remove_past();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ForkCandidate {
    nonce: u64,
    round: u64,
    hash: Hash,
}

/// Lowest nonce at which the processed record loses against a competitor.
///
/// Notarized records compete with round zero, so they beat any received
/// record. Ties go to the smallest hash. Nonces that are not forked and hold
/// a processed record are pruned down to it.
fn find_lowest_fork(headers: &mut HeaderStore) -> Option<ForkCandidate> {
    let mut lowest_fork = None;

    for (nonce, records) in headers.records_mut().iter_mut() {
        if records.len() <= 1 {
            continue;
        }

        let mut processed: Option<&HeaderRecord> = None;
        let mut best: Option<(u64, &Hash)> = None;

        for record in records.iter() {
            let effective_round = match record.state {
                TrustState::Proposed => continue,
                TrustState::Processed => {
                    processed = Some(record);
                    continue;
                }
                TrustState::Notarized => 0,
                TrustState::Received => record.round,
            };

            let candidate = (effective_round, &record.hash);
            if best.map_or(true, |current| candidate < current) {
                best = Some(candidate);
            }
        }

        let Some(processed) = processed else {
            continue;
        };

        let is_forked = best.is_some_and(|(round, hash)| {
            processed.round > round || (processed.round == round && &processed.hash > hash)
        });

        if !is_forked {
            let kept = processed.clone();
            *records = vec![kept];
            continue;
        }

        if lowest_fork.is_none() {
            if let Some((round, hash)) = best {
                lowest_fork = Some(ForkCandidate {
                    nonce: *nonce,
                    round,
                    hash: hash.clone(),
                });
            }
        }
    }

    lowest_fork
}
