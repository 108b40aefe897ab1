use chain::SyncConfig;

/// What the sync loop should do after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureAction {
    /// Drop the attempted header and roll back the current block.
    pub roll_back: bool,
    /// Forget unconfirmed headers and purge the next nonce from the pool.
    pub reset_probable_highest_nonce: bool,
}

/// Failure bookkeeping of the sync loop. Reset after every synced block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncFailureCounters {
    pub sync_with_errors: u32,
    pub requests_with_timeout: u32,
}

impl SyncFailureCounters {
    pub fn record_failure(
        &mut self,
        is_timeout: bool,
        round_index: i64,
        config: &SyncConfig,
    ) -> FailureAction {
        self.sync_with_errors += 1;
        if is_timeout {
            self.requests_with_timeout += 1;
        }

        let is_in_proper_round = config.is_in_proper_round(round_index);
        let timeouts_limit_reached =
            self.requests_with_timeout >= config.max_requests_with_timeout_allowed;
        let errors_limit_reached = self.sync_with_errors >= config.max_sync_with_errors_allowed;

        FailureAction {
            roll_back: !is_timeout || (timeouts_limit_reached && is_in_proper_round),
            reset_probable_highest_nonce: errors_limit_reached && is_in_proper_round,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
