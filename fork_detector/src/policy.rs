use containers::{
    Checkpoint, Hash, Header, HeaderHandler, HeaderRecord, ShardId, TrustState, METACHAIN_SHARD_ID,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{checkpoints::CheckpointTracker, store::HeaderStore};

/// How a chain advances its checkpoints once a header is processed locally.
///
/// Called with the detector's locks held, so implementations must not call
/// back into the detector.
pub trait FinalityPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_processed(
        &self,
        header: &Header,
        hash: &Hash,
        self_notarized: &[(Header, Hash)],
        headers: &mut HeaderStore,
        checkpoints: &mut CheckpointTracker,
    );

    /// Merge headers of this chain notarized by `notarizer`. Returns true
    /// when anything new was learned.
    fn on_self_notarized(
        &self,
        _notarizer: ShardId,
        _self_notarized: &[(Header, Hash)],
        _headers: &mut HeaderStore,
        _checkpoints: &mut CheckpointTracker,
    ) -> bool {
        false
    }

    fn notarized_header_hash(&self, _nonce: u64) -> Option<Hash> {
        None
    }

    /// Forget bookkeeping behind the final checkpoint.
    fn prune_below(&self, _nonce: u64) {}
}

/// Metachain: the final checkpoint trails the last processed header by one.
#[derive(Debug, Default)]
pub struct MetaFinality;

impl FinalityPolicy for MetaFinality {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn on_processed(
        &self,
        header: &Header,
        hash: &Hash,
        _self_notarized: &[(Header, Hash)],
        _headers: &mut HeaderStore,
        checkpoints: &mut CheckpointTracker,
    ) {
        let last = checkpoints.last();
        checkpoints.set_final(last);
        checkpoints.add(Checkpoint::new(header.nonce(), header.round(), hash.clone()));
    }
}

/// Shard: a header becomes final once the metachain notarized the same hash
/// that was processed locally.
#[derive(Debug, Default)]
pub struct ShardFinality {
    notarized: Mutex<BTreeMap<u64, Checkpoint>>,
}

impl ShardFinality {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_self_notarized(
        &self,
        self_notarized: &[(Header, Hash)],
        headers: &mut HeaderStore,
        final_nonce: u64,
    ) -> bool {
        let mut notarized = self.notarized.lock();
        let mut appended = false;

        for (header, hash) in self_notarized {
            if header.nonce() <= final_nonce {
                continue;
            }

            let checkpoint = Checkpoint::new(header.nonce(), header.round(), hash.clone());
            let learned = notarized.get(&header.nonce()) != Some(&checkpoint);
            notarized.insert(header.nonce(), checkpoint);

            let stored = headers.append(HeaderRecord::new(
                header.nonce(),
                header.round(),
                hash.clone(),
                TrustState::Notarized,
            ));

            if learned || stored {
                debug!(
                    round = header.round(),
                    nonce = header.nonce(),
                    hash = %hash,
                    "Added self notarized header"
                );
                appended = true;
            }
        }

        appended
    }

    /// Highest nonce above the current final one whose processed hash is
    /// the notarized hash.
    fn compute_final_checkpoint(&self, headers: &HeaderStore, checkpoints: &mut CheckpointTracker) {
        let notarized = self.notarized.lock();
        let current = checkpoints.final_checkpoint().clone();

        let final_checkpoint = notarized
            .range(current.nonce.saturating_add(1)..)
            .filter(|(nonce, checkpoint)| {
                headers
                    .processed_at(**nonce)
                    .is_some_and(|record| record.hash == checkpoint.hash)
            })
            .map(|(_, checkpoint)| checkpoint.clone())
            .last()
            .unwrap_or(current);

        checkpoints.set_final(final_checkpoint);
    }
}

impl FinalityPolicy for ShardFinality {
    fn name(&self) -> &'static str {
        "shard"
    }

    fn on_processed(
        &self,
        header: &Header,
        hash: &Hash,
        self_notarized: &[(Header, Hash)],
        headers: &mut HeaderStore,
        checkpoints: &mut CheckpointTracker,
    ) {
        let final_nonce = checkpoints.final_checkpoint().nonce;
        self.append_self_notarized(self_notarized, headers, final_nonce);
        self.compute_final_checkpoint(headers, checkpoints);
        checkpoints.add(Checkpoint::new(header.nonce(), header.round(), hash.clone()));
    }

    fn on_self_notarized(
        &self,
        notarizer: ShardId,
        self_notarized: &[(Header, Hash)],
        headers: &mut HeaderStore,
        checkpoints: &mut CheckpointTracker,
    ) -> bool {
        // only the metachain notarizes shard headers
        if notarizer != METACHAIN_SHARD_ID {
            return false;
        }

        let final_nonce = checkpoints.final_checkpoint().nonce;
        let appended = self.append_self_notarized(self_notarized, headers, final_nonce);
        if appended {
            self.compute_final_checkpoint(headers, checkpoints);
        }

        appended
    }

    fn notarized_header_hash(&self, nonce: u64) -> Option<Hash> {
        self.notarized
            .lock()
            .get(&nonce)
            .map(|checkpoint| checkpoint.hash.clone())
    }

    fn prune_below(&self, nonce: u64) {
        let mut notarized = self.notarized.lock();
        *notarized = notarized.split_off(&nonce);
    }
}
