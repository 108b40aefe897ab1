use crate::types::Hash;

/// Outcome of a fork check.
///
/// The cases are mutually exclusive. Forced rollbacks take precedence over a
/// fork found by comparing header records.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ForkStatus {
    #[default]
    NoFork,
    /// Roll back the current block, the chain is stuck on it.
    RollbackOneBlock,
    /// Roll back until the chain tip is below the given nonce.
    RollbackToNonce(u64),
    /// The locally processed header at `nonce` lost against `hash`.
    ///
    /// `round` is the effective round of the winner; zero when it was
    /// notarized by the parent chain.
    ForkAt { nonce: u64, round: u64, hash: Hash },
}

impl ForkStatus {
    pub fn is_detected(&self) -> bool {
        !matches!(self, ForkStatus::NoFork)
    }

    pub fn is_forced(&self) -> bool {
        matches!(
            self,
            ForkStatus::RollbackOneBlock | ForkStatus::RollbackToNonce(_)
        )
    }

    /// Nonce the rollback has to reach, when there is one.
    pub fn nonce(&self) -> Option<u64> {
        match self {
            ForkStatus::RollbackToNonce(nonce) | ForkStatus::ForkAt { nonce, .. } => Some(*nonce),
            ForkStatus::NoFork | ForkStatus::RollbackOneBlock => None,
        }
    }

    /// Hash of the header that should replace the forked one.
    pub fn hash(&self) -> Option<&Hash> {
        match self {
            ForkStatus::ForkAt { hash, .. } => Some(hash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_status_accessors() {
        assert!(!ForkStatus::NoFork.is_detected());
        assert!(ForkStatus::RollbackOneBlock.is_forced());
        assert_eq!(ForkStatus::RollbackOneBlock.nonce(), None);
        assert_eq!(ForkStatus::RollbackToNonce(7).nonce(), Some(7));

        let fork = ForkStatus::ForkAt {
            nonce: 3,
            round: 0,
            hash: Hash::from("h3"),
        };
        assert!(fork.is_detected());
        assert!(!fork.is_forced());
        assert_eq!(fork.hash(), Some(&Hash::from("h3")));
    }
}
