//! Storage layout of the sync engine.
//!
//! Bootstrap records live in [`StorageUnit::Bootstrap`](super::StorageUnit::Bootstrap)
//! under versioned keys.

/// Prefix of the per-round bootstrap record key.
pub const BOOTSTRAP_KEY_PREFIX: &str = "bootstrap/v1/";

/// Key of the highest round with a saved bootstrap record.
pub const HIGHEST_ROUND_KEY: &str = "bootstrap/v1/highest_round";

pub fn bootstrap_key(round: u64) -> String {
    format!("{BOOTSTRAP_KEY_PREFIX}{round}")
}
