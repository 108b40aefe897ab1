use containers::Checkpoint;

/// Checkpoints of locally processed headers plus the final checkpoint.
///
/// Every retained checkpoint has a nonce at or above the final one once
/// [`CheckpointTracker::remove_past`] has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointTracker {
    checkpoints: Vec<Checkpoint>,
    final_checkpoint: Checkpoint,
}

impl Default for CheckpointTracker {
    fn default() -> Self {
        Self {
            checkpoints: vec![Checkpoint::genesis()],
            final_checkpoint: Checkpoint::genesis(),
        }
    }
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the tracker from persisted bookkeeping.
    pub fn restored(last: Checkpoint, final_checkpoint: Checkpoint) -> Self {
        let mut checkpoints = vec![final_checkpoint.clone()];
        if last.nonce > final_checkpoint.nonce {
            checkpoints.push(last);
        }

        Self {
            checkpoints,
            final_checkpoint,
        }
    }

    /// Most recent checkpoint; genesis when none is left.
    pub fn last(&self) -> Checkpoint {
        self.checkpoints.last().cloned().unwrap_or_default()
    }

    pub fn final_checkpoint(&self) -> &Checkpoint {
        &self.final_checkpoint
    }

    pub fn set_final(&mut self, checkpoint: Checkpoint) {
        self.final_checkpoint = checkpoint;
    }

    pub fn add(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    pub fn remove_with_nonce(&mut self, nonce: u64) {
        self.checkpoints.retain(|checkpoint| checkpoint.nonce != nonce);
    }

    /// Prune checkpoints behind the final one.
    pub fn remove_past(&mut self) {
        let final_nonce = self.final_checkpoint.nonce;
        self.checkpoints.retain(|checkpoint| checkpoint.nonce >= final_nonce);
    }

    pub fn all(&self) -> &[Checkpoint] {
        &self.checkpoints
    }
}
