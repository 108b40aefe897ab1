use crate::types::Hash;
use serde::{Deserialize, Serialize};

/// Trust level at which a header was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustState {
    /// Seen as a consensus proposal; not yet agreed on.
    Proposed,
    /// Received from the network.
    Received,
    /// Processed and committed locally.
    Processed,
    /// Notarized by the parent chain.
    Notarized,
}

impl TrustState {
    /// State kept when a header with the same hash is observed again.
    ///
    /// `Processed` is never overwritten. Any other stored state is replaced by
    /// an incoming `Notarized` or `Processed`; weaker observations are ignored.
    pub fn upgrade(self, incoming: TrustState) -> TrustState {
        match (self, incoming) {
            (TrustState::Processed, _) => TrustState::Processed,
            (_, TrustState::Notarized | TrustState::Processed) => incoming,
            (stored, _) => stored,
        }
    }
}

/// One observation of a header at a nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub nonce: u64,
    pub round: u64,
    pub hash: Hash,
    pub state: TrustState,
}

impl HeaderRecord {
    pub fn new(nonce: u64, round: u64, hash: Hash, state: TrustState) -> Self {
        Self {
            nonce,
            round,
            hash,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TrustState::*;
    use rstest::rstest;

    #[rstest]
    #[case(Received, Processed, Processed)]
    #[case(Processed, Received, Processed)]
    #[case(Processed, Notarized, Processed)]
    #[case(Received, Notarized, Notarized)]
    #[case(Notarized, Processed, Processed)]
    #[case(Notarized, Received, Notarized)]
    #[case(Proposed, Received, Proposed)]
    #[case(Received, Proposed, Received)]
    fn test_upgrade(
        #[case] stored: super::TrustState,
        #[case] incoming: super::TrustState,
        #[case] expected: super::TrustState,
    ) {
        assert_eq!(stored.upgrade(incoming), expected);
    }
}
