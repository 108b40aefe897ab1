use containers::{Checkpoint, Hash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{
    config::{bootstrap_key, HIGHEST_ROUND_KEY},
    error::SyncError,
    interfaces::{StorageUnit, Storer},
};

/// State needed to resume synchronization after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BootstrapData {
    pub epoch: u32,
    pub round: u64,
    pub last_header_nonce: u64,
    pub last_header_hash: Hash,
    pub last_checkpoint: Checkpoint,
    pub final_checkpoint: Checkpoint,
}

/// Reads and writes [`BootstrapData`] records, one per committed round.
#[derive(Clone)]
pub struct BootStorage {
    storer: Arc<dyn Storer>,
}

impl BootStorage {
    pub fn new(storer: Arc<dyn Storer>) -> Self {
        Self { storer }
    }

    /// Save `data` under its round and mark that round as the highest.
    pub fn put(&self, data: &BootstrapData) -> Result<(), SyncError> {
        let encoded = serde_json::to_vec(data)?;
        self.storer
            .put(StorageUnit::Bootstrap, bootstrap_key(data.round).as_bytes(), encoded)
            .map_err(SyncError::Storage)?;
        self.save_last_round(data.round)?;

        debug!(
            round = data.round,
            nonce = data.last_header_nonce,
            final_nonce = data.final_checkpoint.nonce,
            "Saved bootstrap data"
        );

        Ok(())
    }

    pub fn get(&self, round: u64) -> Result<Option<BootstrapData>, SyncError> {
        let bytes = self
            .storer
            .get(StorageUnit::Bootstrap, bootstrap_key(round).as_bytes())
            .map_err(SyncError::Storage)?;

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn highest_round(&self) -> Result<Option<u64>, SyncError> {
        let bytes = self
            .storer
            .get(StorageUnit::Bootstrap, HIGHEST_ROUND_KEY.as_bytes())
            .map_err(SyncError::Storage)?;

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Point the highest round at `round`. Used after a rollback so a
    /// restart resumes from the block the chain was rolled back to.
    pub fn save_last_round(&self, round: u64) -> Result<(), SyncError> {
        let encoded = serde_json::to_vec(&round)?;
        self.storer
            .put(StorageUnit::Bootstrap, HIGHEST_ROUND_KEY.as_bytes(), encoded)
            .map_err(SyncError::Storage)
    }

    /// Record saved at the highest round, if any.
    pub fn load_latest(&self) -> Result<Option<BootstrapData>, SyncError> {
        match self.highest_round()? {
            Some(round) => self.get(round),
            None => Ok(None),
        }
    }
}
