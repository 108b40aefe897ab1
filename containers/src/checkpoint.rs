use crate::types::Hash;
use serde::{Deserialize, Serialize};

/// Represents a checkpoint in the chain's history.
///
/// A checkpoint marks a locally processed header. The final checkpoint is the
/// highest one that can no longer be reorganized away.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub nonce: u64,
    pub round: u64,
    /// Empty for the genesis checkpoint.
    pub hash: Hash,
}

impl Checkpoint {
    pub fn new(nonce: u64, round: u64, hash: Hash) -> Self {
        Self { nonce, round, hash }
    }

    /// The checkpoint every chain starts from.
    pub fn genesis() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_checkpoint() {
        let checkpoint = Checkpoint::genesis();
        assert_eq!(checkpoint.nonce, 0);
        assert_eq!(checkpoint.round, 0);
        assert!(checkpoint.hash.is_empty());
    }

    #[test]
    fn test_checkpoint_equality() {
        let cp1 = Checkpoint::new(3, 4, Hash::from("h3"));
        let cp2 = Checkpoint {
            nonce: 3,
            round: 4,
            hash: Hash::from("h3"),
        };
        assert_eq!(cp1, cp2);
        assert_ne!(cp1, Checkpoint::genesis());
    }
}
