use containers::Hash;
use thiserror::Error;

/// Reasons a header is rejected by the fork detector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkDetectorError {
    #[error("header hash is empty")]
    EmptyHash,

    #[error("header {0} is black listed")]
    HeaderIsBlackListed(Hash),

    #[error("genesis time mismatch: header implies {implied}, expected {expected}")]
    GenesisTimeMismatch { implied: i64, expected: u64 },

    #[error("round {round} is not above the final checkpoint round {final_round}")]
    LowerRoundInBlock { round: u64, final_round: u64 },

    #[error("nonce {nonce} is not above the final checkpoint nonce {final_nonce}")]
    LowerNonceInBlock { nonce: u64, final_nonce: u64 },

    #[error("round {round} is ahead of the next round {next_round}")]
    HigherRoundInBlock { round: u64, next_round: i64 },

    #[error("nonce advanced by {nonce_dif} in only {round_dif} rounds")]
    HigherNonceInBlock { round_dif: i64, nonce_dif: i64 },

    #[error("proposed header does not carry its random seeds")]
    RandomSeedNotValid,

    #[error("header is not signed")]
    BlockIsNotSigned,
}
