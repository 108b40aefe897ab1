pub mod server;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not utf8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    is_syncing: IntGauge,
    connected_to_network: IntGauge,
    // Sync
    current_nonce: IntGauge,
    probable_highest_nonce: IntGauge,
    final_nonce: IntGauge,
    fork_choice_count: IntCounterVec,
    rollbacks: IntCounterVec,
    sync_errors: IntCounterVec,
    block_processing_time: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let is_syncing = IntGauge::with_opts(Opts::new(
            "chain_sync_is_syncing",
            "1 while the node is not synchronized, 0 otherwise",
        ))?;
        registry.register(Box::new(is_syncing.clone()))?;

        let connected_to_network = IntGauge::with_opts(Opts::new(
            "chain_sync_connected_to_network",
            "1 when the node sees enough peers",
        ))?;
        registry.register(Box::new(connected_to_network.clone()))?;

        // Sync
        let current_nonce = IntGauge::with_opts(Opts::new(
            "chain_sync_current_nonce",
            "Nonce of the current chain tip",
        ))?;
        registry.register(Box::new(current_nonce.clone()))?;

        let probable_highest_nonce = IntGauge::with_opts(Opts::new(
            "chain_sync_probable_highest_nonce",
            "Estimated highest nonce of the network",
        ))?;
        registry.register(Box::new(probable_highest_nonce.clone()))?;

        let final_nonce = IntGauge::with_opts(Opts::new(
            "chain_sync_final_nonce",
            "Nonce of the final checkpoint",
        ))?;
        registry.register(Box::new(final_nonce.clone()))?;

        let fork_choice_count = IntCounterVec::new(
            Opts::new(
                "chain_sync_fork_choice_total",
                "Total number of sync steps that found a fork",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(fork_choice_count.clone()))?;

        let rollbacks = IntCounterVec::new(
            Opts::new("chain_sync_rollbacks_total", "Total number of rolled back blocks"),
            &[],
        )?;
        registry.register(Box::new(rollbacks.clone()))?;

        let sync_errors = IntCounterVec::new(
            Opts::new("chain_sync_errors_total", "Total number of failed sync steps"),
            &["reason"],
        )?;
        registry.register(Box::new(sync_errors.clone()))?;

        let block_processing_time = HistogramVec::new(
            HistogramOpts::new(
                "chain_sync_block_processing_time_seconds",
                "Time taken to process and commit a synced block",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 1.0]),
            &[],
        )?;
        registry.register(Box::new(block_processing_time.clone()))?;

        Ok(Self {
            registry,
            is_syncing,
            connected_to_network,
            current_nonce,
            probable_highest_nonce,
            final_nonce,
            fork_choice_count,
            rollbacks,
            sync_errors,
            block_processing_time,
        })
    }

    pub fn gather(&self) -> Result<String, MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn set_is_syncing(&self, is_syncing: bool) {
        self.is_syncing.set(i64::from(is_syncing));
    }

    pub fn set_connected_to_network(&self, connected: bool) {
        self.connected_to_network.set(i64::from(connected));
    }

    // Sync
    pub fn set_current_nonce(&self, nonce: u64) {
        self.current_nonce.set(nonce as i64);
    }

    pub fn set_probable_highest_nonce(&self, nonce: u64) {
        self.probable_highest_nonce.set(nonce as i64);
    }

    pub fn set_final_nonce(&self, nonce: u64) {
        self.final_nonce.set(nonce as i64);
    }

    pub fn inc_fork_choice(&self, kind: &str) {
        self.fork_choice_count.with_label_values(&[kind]).inc();
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.with_label_values::<&str>(&[]).inc();
    }

    pub fn inc_sync_errors(&self, reason: &str) {
        self.sync_errors.with_label_values(&[reason]).inc();
    }

    pub fn observe_block_processing_time(&self, duration: f64) {
        self.block_processing_time
            .with_label_values::<&str>(&[])
            .observe(duration);
    }
}

pub type SharedMetrics = Arc<Metrics>;
