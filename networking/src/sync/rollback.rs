use containers::{ForkStatus, Header, HeaderHandler};
use tracing::{debug, info};

use super::{
    error::{HeaderKey, SyncError},
    interfaces::ChainTip,
    service::Bootstrapper,
};

impl Bootstrapper {
    /// Undo committed blocks.
    ///
    /// Without `using_fork` exactly one block is rolled back and the final
    /// block can never be undone. With it, blocks are rolled back until the
    /// chain tip sits below the nonce of the current fork status.
    pub async fn roll_back(&self, using_fork: bool) -> Result<(), SyncError> {
        let fork = self.fork_status();
        let fork_nonce = if using_fork { fork.nonce() } else { None };

        loop {
            let current = self.chain.tip().ok_or(SyncError::NilBlockHeader)?;
            let nonce = current.header.nonce();

            if fork_nonce.is_none() && nonce <= self.fork_detector.highest_final_block_nonce() {
                return Err(SyncError::RollBackBehindFinalHeader);
            }

            if let Some(fork_nonce) = fork_nonce {
                if nonce < fork_nonce {
                    return Err(SyncError::RollBackBehindForkNonce);
                }
            }

            let previous = self.previous_block(&current)?;

            info!(
                chain = ?self.role,
                nonce,
                round = current.header.round(),
                hash = %current.hash,
                previous_hash = %previous.hash,
                "Rolling back block"
            );

            self.roll_back_one_block(&current, previous.clone()).await?;

            if let Err(err) = self.boot_storage.save_last_round(previous.header.round()) {
                debug!(error = %err, round = previous.header.round(), "Cannot save last round");
            }

            if using_fork && self.is_fork_triggered_by_meta(&fork) {
                debug!(hash = %current.hash, "Black listing header discarded by metachain notarization");
                self.black_list.add(current.hash.clone());
            }

            match fork_nonce {
                Some(fork_nonce) if nonce > fork_nonce => continue,
                _ => break,
            }
        }

        Ok(())
    }

    async fn roll_back_one_block(&self, current: &ChainTip, previous: ChainTip) -> Result<(), SyncError> {
        let previous_header = previous.header.clone();
        let new_tip = (current.header.nonce() > 1).then_some(previous);
        self.chain.set_tip(new_tip);

        let result = self.undo_block(current, &previous_header).await;
        if let Err(err) = result {
            debug!(error = %err, nonce = current.header.nonce(), "Roll back failed, restoring state");
            self.restore_state(current).await;
            return Err(err);
        }

        self.metrics.inc_rollbacks();
        self.metrics
            .set_current_nonce(current.header.nonce().saturating_sub(1));

        Ok(())
    }

    async fn undo_block(&self, current: &ChainTip, previous: &Header) -> Result<(), SyncError> {
        self.executor.revert_state_to_block(previous).await?;
        self.executor
            .prune_state_on_rollback(&current.header, previous)
            .await;
        self.executor
            .restore_block_into_pools(&current.header, &current.body)
            .await?;
        self.clean_caches_and_storage_on_rollback(current);

        Ok(())
    }

    async fn restore_state(&self, current: &ChainTip) {
        self.chain.set_tip(Some(current.clone()));

        if let Err(err) = self.executor.revert_state_to_block(&current.header).await {
            debug!(error = %err, nonce = current.header.nonce(), "Cannot revert state while restoring");
        }
    }

    /// Block the rolled back one was built on. The genesis block has an
    /// empty body.
    fn previous_block(&self, current: &ChainTip) -> Result<ChainTip, SyncError> {
        let hash = current.header.prev_hash().clone();
        let header = self
            .header_from_storage(&hash)?
            .ok_or_else(|| SyncError::MissingHeader(HeaderKey::Hash(hash.clone())))?;
        let body = self.committed_body(&header)?;

        Ok(ChainTip { header, hash, body })
    }

    fn clean_caches_and_storage_on_rollback(&self, current: &ChainTip) {
        let nonce = current.header.nonce();

        self.headers_pool.remove_by_hash(&current.hash);
        self.fork_detector.remove_headers(nonce, &current.hash);
        self.remove_nonce_index(nonce);
    }

    /// A shard fork whose winner was notarized by the metachain.
    fn is_fork_triggered_by_meta(&self, fork: &ForkStatus) -> bool {
        !self.role.is_meta() && matches!(fork, ForkStatus::ForkAt { round: 0, .. })
    }

    pub(super) async fn roll_back_one_block_forced(&self) {
        if let Err(err) = self.roll_back(false).await {
            debug!(error = %err, "Forced roll back of one block");
        }

        self.fork_detector.reset_fork();
        self.remove_headers_with_nonce_from_pool(self.nonce_for_next_block());
    }

    pub(super) async fn roll_back_to_nonce_forced(&self) {
        if let Err(err) = self.roll_back(true).await {
            debug!(error = %err, "Forced roll back to nonce");
        }

        self.fork_detector.reset_probable_highest_nonce();
        self.remove_headers_with_nonce_from_pool(self.nonce_for_next_block());
    }
}
