use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const ROUND_DURATION_MS: u64 = 5_000;
pub const SLEEP_TIME_MS: u64 = 5;
pub const STATUS_LOG_INTERVAL_MS: u64 = 10_000;
pub const BLACK_LIST_TTL_MS: u64 = 10 * ROUND_DURATION_MS;

pub const MAX_REQUESTS_WITH_TIMEOUT_ALLOWED: u32 = 5;
pub const MAX_SYNC_WITH_ERRORS_ALLOWED: u32 = 10;
pub const MAX_HEADERS_TO_REQUEST_IN_ADVANCE: u64 = 10;
pub const ROUND_MODULUS_TRIGGER: i64 = 5;
pub const ROUND_MODULUS_TRIGGER_WHEN_SYNC_IS_STUCK: i64 = 20;
pub const MAX_ROUNDS_WITHOUT_NEW_BLOCK_RECEIVED: u64 = 10;
pub const MAX_ROUNDS_WITHOUT_COMMITTED_BLOCK: u64 = 10;
pub const MAX_ROUNDS_TO_WAIT: i64 = 5;
pub const BLOCK_FINALITY: u64 = 1;

/// Thresholds and timings of fork detection and block synchronization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Unix time, in seconds, of round zero.
    pub genesis_time: u64,
    /// How long the sync loop waits for a requested header or body.
    pub wait_time_ms: u64,
    pub sleep_time_ms: u64,
    pub status_log_interval_ms: u64,
    pub black_list_ttl_ms: u64,
    pub max_requests_with_timeout_allowed: u32,
    pub max_sync_with_errors_allowed: u32,
    pub max_headers_to_request_in_advance: u64,
    pub round_modulus_trigger: i64,
    pub round_modulus_trigger_when_sync_is_stuck: i64,
    pub max_rounds_without_new_block_received: u64,
    pub max_rounds_without_committed_block: u64,
    /// Rounds without any new header after which the probable highest nonce
    /// falls back to the last checkpoint.
    pub max_rounds_to_wait: i64,
    pub block_finality: u64,
}

pub const DEFAULT_SYNC_CONFIG: SyncConfig = SyncConfig {
    genesis_time: 0,
    wait_time_ms: ROUND_DURATION_MS,
    sleep_time_ms: SLEEP_TIME_MS,
    status_log_interval_ms: STATUS_LOG_INTERVAL_MS,
    black_list_ttl_ms: BLACK_LIST_TTL_MS,
    max_requests_with_timeout_allowed: MAX_REQUESTS_WITH_TIMEOUT_ALLOWED,
    max_sync_with_errors_allowed: MAX_SYNC_WITH_ERRORS_ALLOWED,
    max_headers_to_request_in_advance: MAX_HEADERS_TO_REQUEST_IN_ADVANCE,
    round_modulus_trigger: ROUND_MODULUS_TRIGGER,
    round_modulus_trigger_when_sync_is_stuck: ROUND_MODULUS_TRIGGER_WHEN_SYNC_IS_STUCK,
    max_rounds_without_new_block_received: MAX_ROUNDS_WITHOUT_NEW_BLOCK_RECEIVED,
    max_rounds_without_committed_block: MAX_ROUNDS_WITHOUT_COMMITTED_BLOCK,
    max_rounds_to_wait: MAX_ROUNDS_TO_WAIT,
    block_finality: BLOCK_FINALITY,
};

impl Default for SyncConfig {
    fn default() -> Self {
        DEFAULT_SYNC_CONFIG
    }
}

impl SyncConfig {
    /// Load a config from a YAML file. Missing keys keep their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open sync config {}", path.display()))?;
        let config: SyncConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse sync config {}", path.display()))?;

        info!(
            path = %path.display(),
            wait_time_ms = config.wait_time_ms,
            genesis_time = config.genesis_time,
            "Sync config loaded"
        );

        Ok(config)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }

    pub fn status_log_interval(&self) -> Duration {
        Duration::from_millis(self.status_log_interval_ms)
    }

    pub fn black_list_ttl(&self) -> Duration {
        Duration::from_millis(self.black_list_ttl_ms)
    }

    /// Rounds in which recovery actions are allowed to fire.
    pub fn is_in_proper_round(&self, round_index: i64) -> bool {
        self.round_modulus_trigger > 0 && round_index % self.round_modulus_trigger == 0
    }
}
