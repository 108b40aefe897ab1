use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current consensus round.
pub trait RoundProvider: Send + Sync {
    /// Index of the current round. Negative before genesis.
    fn index(&self) -> i64;

    fn time_duration(&self) -> Duration;
}

/// Round clock derived from the wall clock and the genesis time.
#[derive(Clone, Debug)]
pub struct Rounder {
    genesis_time: u64,
    round_duration: Duration,
}

impl Rounder {
    pub fn new(genesis_time: u64, round_duration: Duration) -> Self {
        Self {
            genesis_time,
            round_duration,
        }
    }

    fn index_at(&self, now: Duration) -> i64 {
        let duration_ms = self.round_duration.as_millis() as i64;
        if duration_ms == 0 {
            return 0;
        }

        let elapsed_ms = now.as_millis() as i64 - (self.genesis_time as i64) * 1_000;
        elapsed_ms.div_euclid(duration_ms)
    }
}

impl RoundProvider for Rounder {
    fn index(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.index_at(now)
    }

    fn time_duration(&self) -> Duration {
        self.round_duration
    }
}

/// Round provider advanced by hand. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualRounder {
    index: AtomicI64,
    round_duration: Duration,
}

impl ManualRounder {
    pub fn new(index: i64, round_duration: Duration) -> Self {
        Self {
            index: AtomicI64::new(index),
            round_duration,
        }
    }

    pub fn set_index(&self, index: i64) {
        self.index.store(index, Ordering::SeqCst);
    }

    pub fn advance(&self, rounds: i64) -> i64 {
        self.index.fetch_add(rounds, Ordering::SeqCst) + rounds
    }
}

impl RoundProvider for ManualRounder {
    fn index(&self) -> i64 {
        self.index.load(Ordering::SeqCst)
    }

    fn time_duration(&self) -> Duration {
        self.round_duration
    }
}
