use containers::Hash;
use fork_detector::ForkDetectorError;
use std::fmt;
use thiserror::Error;

/// Key a header was looked up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderKey {
    Nonce(u64),
    Hash(Hash),
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderKey::Nonce(nonce) => write!(f, "nonce {nonce}"),
            HeaderKey::Hash(hash) => write!(f, "hash {hash}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("time is out")]
    TimeIsOut,
    #[error("missing header with {0}")]
    MissingHeader(HeaderKey),
    #[error("missing block body")]
    MissingBody,
    #[error("current block header is not set")]
    NilBlockHeader,
    #[error("header does not belong to this chain")]
    WrongHeaderType,
    #[error("roll back behind final header")]
    RollBackBehindFinalHeader,
    #[error("roll back behind fork nonce")]
    RollBackBehindForkNonce,
    #[error(transparent)]
    ForkDetector(#[from] ForkDetectorError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl SyncError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::TimeIsOut)
    }

    /// Label used for the sync error counter.
    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::TimeIsOut => "timeout",
            SyncError::MissingHeader(_) => "missing_header",
            SyncError::MissingBody => "missing_body",
            SyncError::NilBlockHeader | SyncError::WrongHeaderType => "structural",
            SyncError::RollBackBehindFinalHeader | SyncError::RollBackBehindForkNonce => "rollback",
            SyncError::ForkDetector(_) => "validation",
            SyncError::Codec(_) | SyncError::Storage(_) => "storage",
            SyncError::Collaborator(_) => "collaborator",
        }
    }
}
