use containers::Hash;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::error::SyncError;

/// Single-slot wake up signal between a producer and the sync loop.
///
/// Notifications sent while one is already pending are dropped.
pub struct Signal {
    sender: mpsc::Sender<()>,
    receiver: AsyncMutex<mpsc::Receiver<()>>,
}

impl Signal {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(1);
        Self {
            sender,
            receiver: AsyncMutex::new(receiver),
        }
    }

    pub fn notify(&self) {
        let _ = self.sender.try_send(());
    }

    /// Discard a pending notification. No-op while someone is waiting.
    pub fn drain(&self) {
        if let Ok(mut receiver) = self.receiver.try_lock() {
            while receiver.try_recv().is_ok() {}
        }
    }

    /// Consume a pending notification without waiting.
    pub fn try_take(&self) -> bool {
        match self.receiver.try_lock() {
            Ok(mut receiver) => receiver.try_recv().is_ok(),
            Err(_) => false,
        }
    }

    pub async fn wait(&self, timeout: Duration) -> Result<(), SyncError> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(())) => Ok(()),
            Ok(None) | Err(_) => Err(SyncError::TimeIsOut),
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// Header the sync loop is currently waiting for, by nonce or by hash.
#[derive(Debug, Default)]
pub struct RequestedHeader {
    nonce: Mutex<Option<u64>>,
    hash: Mutex<Option<Hash>>,
}

impl RequestedHeader {
    pub fn set_nonce(&self, nonce: Option<u64>) {
        *self.nonce.lock() = nonce;
    }

    pub fn set_hash(&self, hash: Option<Hash>) {
        *self.hash.lock() = hash;
    }

    pub fn clear(&self) {
        self.set_nonce(None);
        self.set_hash(None);
    }

    /// Clear the nonce and return true if `nonce` was the requested one.
    pub fn take_if_nonce(&self, nonce: u64) -> bool {
        let mut requested = self.nonce.lock();
        if *requested == Some(nonce) {
            *requested = None;
            return true;
        }
        false
    }

    pub fn take_if_hash(&self, hash: &Hash) -> bool {
        let mut requested = self.hash.lock();
        if requested.as_ref() == Some(hash) {
            *requested = None;
            return true;
        }
        false
    }
}

/// Mini blocks requested for the block being synced.
#[derive(Debug, Default)]
pub struct RequiredMiniBlocks {
    expected: Mutex<HashMap<Hash, bool>>,
}

impl RequiredMiniBlocks {
    pub fn set(&self, hashes: &[Hash]) {
        *self.expected.lock() = hashes.iter().map(|hash| (hash.clone(), false)).collect();
    }

    pub fn clear(&self) {
        self.expected.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.expected.lock().is_empty()
    }

    /// Mark `hash` as received. Returns true once every expected mini block
    /// arrived, and forgets the set.
    pub fn received(&self, hash: &Hash) -> bool {
        let mut expected = self.expected.lock();
        if expected.is_empty() {
            return false;
        }

        if let Some(received) = expected.get_mut(hash) {
            *received = true;
        }

        if expected.values().all(|received| *received) {
            expected.clear();
            return true;
        }

        false
    }
}
