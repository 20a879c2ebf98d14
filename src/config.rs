//! Run configuration for both load modes.
//!
//! [`CryptoConfig`] and [`UdpConfig`] are the immutable values handed to the
//! engine; [`validate_crypto`] and [`validate_udp`] reject malformed input
//! before any worker starts.  [`LoadgenConfig`] is the optional TOML file that
//! supplies defaults for every command-line option.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "LOADGEN_CONFIG";

pub const DEFAULT_DATA_SIZE: usize = 1024;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_TARGET: &str = "127.0.0.1:1";
pub const DEFAULT_RATE: f64 = 0.0;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration value that cannot be run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("data-size must be greater than 0")]
    ZeroDataSize,

    #[error("workers must be greater than 0")]
    ZeroWorkers,

    #[error("target cannot be empty")]
    EmptyTarget,

    #[error("invalid target format {target:?}: {reason}")]
    InvalidTarget { target: String, reason: &'static str },

    #[error("target host cannot be empty")]
    EmptyHost,

    #[error("invalid port number {port:?}")]
    InvalidPort { port: String },

    #[error("port must be between 1 and 65535, got {port}")]
    PortOutOfRange { port: i64 },

    #[error("rate must be a finite number >= 0, got {rate}")]
    InvalidRate { rate: f64 },
}

// ---------------------------------------------------------------------------
// Engine configs
// ---------------------------------------------------------------------------

/// Configuration for the SHA-256 stress mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoConfig {
    /// Bytes hashed per digest computation.
    pub data_size: usize,
    /// Number of concurrent hash workers.
    pub workers: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            data_size: DEFAULT_DATA_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Configuration for the UDP flood mode.
#[derive(Debug, Clone, PartialEq)]
pub struct UdpConfig {
    /// Destination as `host:port`.
    pub target: String,
    /// Aggregate packets per second across all workers; `0` means unlimited.
    pub rate: f64,
    /// Number of concurrent sender workers.
    pub workers: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            rate: DEFAULT_RATE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Check a crypto-mode configuration.
pub fn validate_crypto(config: &CryptoConfig) -> Result<(), ConfigError> {
    if config.data_size == 0 {
        return Err(ConfigError::ZeroDataSize);
    }
    if config.workers == 0 {
        return Err(ConfigError::ZeroWorkers);
    }
    Ok(())
}

/// Check a UDP-mode configuration.
///
/// The target must be `host:port` (IPv6 hosts in brackets, e.g. `[::1]:9`)
/// with a non-empty host and a port in `1..=65535`.  The host is not
/// resolved here; resolution happens per worker.
pub fn validate_udp(config: &UdpConfig) -> Result<(), ConfigError> {
    if config.target.is_empty() {
        return Err(ConfigError::EmptyTarget);
    }

    let (host, port) = split_host_port(&config.target)?;
    if host.is_empty() {
        return Err(ConfigError::EmptyHost);
    }

    let port_num: i64 = port.parse().map_err(|_| ConfigError::InvalidPort {
        port: port.to_string(),
    })?;
    if !(1..=65535).contains(&port_num) {
        return Err(ConfigError::PortOutOfRange { port: port_num });
    }

    if !config.rate.is_finite() || config.rate < 0.0 {
        return Err(ConfigError::InvalidRate { rate: config.rate });
    }

    if config.workers == 0 {
        return Err(ConfigError::ZeroWorkers);
    }

    Ok(())
}

/// Split `host:port` into its two halves without interpreting either.
///
/// Bracketed hosts (`[fe80::1]:53`) may contain colons; bare hosts may not.
pub fn split_host_port(target: &str) -> Result<(&str, &str), ConfigError> {
    let invalid = |reason| ConfigError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    if let Some(rest) = target.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        if port.contains([':', '[', ']']) {
            return Err(invalid("unexpected characters after port separator"));
        }
        return Ok((host, port));
    }

    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port in address"))?;
    if host.contains(':') {
        return Err(invalid("too many colons in address"));
    }
    if host.contains(['[', ']']) {
        return Err(invalid("unexpected bracket in address"));
    }
    Ok((host, port))
}

// ---------------------------------------------------------------------------
// File config
// ---------------------------------------------------------------------------

/// Root of the optional `loadgen.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadgenConfig {
    #[serde(default)]
    pub crypto: CryptoSection,
    #[serde(default)]
    pub udp: UdpSection,
    #[serde(default)]
    pub run: RunSection,
}

/// `[crypto]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CryptoSection {
    pub data_size: usize,
    pub workers: usize,
}

impl Default for CryptoSection {
    fn default() -> Self {
        Self {
            data_size: DEFAULT_DATA_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// `[udp]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UdpSection {
    pub target: String,
    /// Packets per second across all workers (0 = unlimited).
    pub rate: f64,
    pub workers: usize,
}

impl Default for UdpSection {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            rate: DEFAULT_RATE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// `[run]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    /// Stop the run after this long, e.g. `"30s"`.  Unset means run until interrupted.
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,
}

impl LoadgenConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded loadgen configuration");
        Ok(config)
    }

    /// Resolve the config file to use:
    /// 1. `explicit` (the `--config` flag), which must load if given.
    /// 2. The path in `LOADGEN_CONFIG`, which must load if set.
    /// 3. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            return Self::load(&path)
                .with_context(|| format!("{} points at an unusable file", CONFIG_ENV));
        }

        debug!("no config file given, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn crypto_config(&self) -> CryptoConfig {
        CryptoConfig {
            data_size: self.crypto.data_size,
            workers: self.crypto.workers,
        }
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            target: self.udp.target.clone(),
            rate: self.udp.rate,
            workers: self.udp.workers,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
