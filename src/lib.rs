//! loadgen -- CPU hash stress and UDP flood load generator.
//!
//! This crate provides the worker-pool engine behind the `loadgen` binary:
//! config validation, the SHA-256 and UDP workloads, rate division, and the
//! cancellation wiring that stops a run.

pub mod config;
pub mod engine;
pub mod shutdown;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use config::{CryptoConfig, UdpConfig};
use engine::{EngineError, EngineStats};

/// A fully built run, one variant per mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    Crypto(CryptoConfig),
    Udp(UdpConfig),
}

impl Workload {
    /// Validate without running.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        match self {
            Workload::Crypto(cfg) => config::validate_crypto(cfg),
            Workload::Udp(cfg) => config::validate_udp(cfg),
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            Workload::Crypto(cfg) => cfg.workers,
            Workload::Udp(cfg) => cfg.workers,
        }
    }
}

/// Run `workload` until `cancel` fires, recording progress into `stats`.
pub async fn run(
    workload: &Workload,
    cancel: CancellationToken,
    stats: &Arc<EngineStats>,
) -> Result<(), EngineError> {
    match workload {
        Workload::Crypto(cfg) => engine::run_crypto_with_stats(cfg, cancel, stats).await,
        Workload::Udp(cfg) => engine::run_udp_with_stats(cfg, cancel, stats).await,
    }
}
