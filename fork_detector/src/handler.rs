use containers::{Checkpoint, ForkStatus, Hash, Header, ShardId, TrustState};

use crate::{detector::ForkDetector, error::ForkDetectorError, policy::FinalityPolicy};

/// Object-safe view of a fork detector, whatever its finality policy.
pub trait ForkDetectorHandler: Send + Sync {
    fn add_header(
        &self,
        header: &Header,
        hash: &Hash,
        state: TrustState,
        self_notarized: &[(Header, Hash)],
    ) -> Result<(), ForkDetectorError>;
    fn received_self_notarized_headers(&self, notarizer: ShardId, self_notarized: &[(Header, Hash)]);
    fn check_fork(&self) -> ForkStatus;
    fn remove_headers(&self, nonce: u64, hash: &Hash);
    fn probable_highest_nonce(&self) -> u64;
    fn highest_final_block_nonce(&self) -> u64;
    fn reset_probable_highest_nonce_if_needed(&self);
    fn reset_probable_highest_nonce(&self);
    fn reset_fork(&self);
    fn set_roll_back_nonce(&self, nonce: u64);
    fn notarized_header_hash(&self, nonce: u64) -> Option<Hash>;
    fn restore_checkpoints(&self, last: Checkpoint, final_checkpoint: Checkpoint);
    fn last_checkpoint(&self) -> Checkpoint;
    fn final_checkpoint(&self) -> Checkpoint;
}

impl<P: FinalityPolicy> ForkDetectorHandler for ForkDetector<P> {
    fn add_header(
        &self,
        header: &Header,
        hash: &Hash,
        state: TrustState,
        self_notarized: &[(Header, Hash)],
    ) -> Result<(), ForkDetectorError> {
        ForkDetector::add_header(self, header, hash, state, self_notarized)
    }

    fn received_self_notarized_headers(&self, notarizer: ShardId, self_notarized: &[(Header, Hash)]) {
        ForkDetector::received_self_notarized_headers(self, notarizer, self_notarized)
    }

    fn check_fork(&self) -> ForkStatus {
        ForkDetector::check_fork(self)
    }

    fn remove_headers(&self, nonce: u64, hash: &Hash) {
        ForkDetector::remove_headers(self, nonce, hash)
    }

    fn probable_highest_nonce(&self) -> u64 {
        ForkDetector::probable_highest_nonce(self)
    }

    fn highest_final_block_nonce(&self) -> u64 {
        ForkDetector::highest_final_block_nonce(self)
    }

    fn reset_probable_highest_nonce_if_needed(&self) {
        ForkDetector::reset_probable_highest_nonce_if_needed(self)
    }

    fn reset_probable_highest_nonce(&self) {
        ForkDetector::reset_probable_highest_nonce(self)
    }

    fn reset_fork(&self) {
        ForkDetector::reset_fork(self)
    }

    fn set_roll_back_nonce(&self, nonce: u64) {
        ForkDetector::set_roll_back_nonce(self, nonce)
    }

    fn notarized_header_hash(&self, nonce: u64) -> Option<Hash> {
        ForkDetector::notarized_header_hash(self, nonce)
    }

    fn restore_checkpoints(&self, last: Checkpoint, final_checkpoint: Checkpoint) {
        ForkDetector::restore_checkpoints(self, last, final_checkpoint)
    }

    fn last_checkpoint(&self) -> Checkpoint {
        ForkDetector::last_checkpoint(self)
    }

    fn final_checkpoint(&self) -> Checkpoint {
        ForkDetector::final_checkpoint(self)
    }
}
