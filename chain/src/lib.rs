pub mod config;
pub mod round;

pub use config::{SyncConfig, DEFAULT_SYNC_CONFIG};
pub use round::{ManualRounder, RoundProvider, Rounder};
