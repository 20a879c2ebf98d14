use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use loadgen::config::{CryptoConfig, LoadgenConfig, UdpConfig};
use loadgen::engine::EngineStats;
use loadgen::{shutdown, Workload};

#[derive(Parser)]
#[command(
    name = "loadgen",
    about = "CPU hash stress and UDP flood load generator",
    version,
    long_about = None
)]
struct Cli {
    /// Workload to run
    #[arg(long, value_enum)]
    mode: Mode,

    /// Bytes hashed per SHA-256 operation (crypto mode) [default: 1024]
    #[arg(long)]
    data_size: Option<usize>,

    /// Number of concurrent workers [default: 1]
    #[arg(long)]
    workers: Option<usize>,

    /// Target address as host:port (udp mode) [default: 127.0.0.1:1]
    #[arg(long)]
    target: Option<String>,

    /// Packets per second across all workers, 0 = unlimited (udp mode) [default: 0]
    #[arg(long, allow_negative_numbers = true)]
    rate: Option<f64>,

    /// Stop after this long, e.g. "30s" or "5m" (default: run until interrupted)
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// TOML config file (falls back to $LOADGEN_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Hash a fixed buffer with SHA-256 in a tight loop
    Crypto,
    /// Send small UDP datagrams to a target
    Udp,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Crypto => "crypto",
            Mode::Udp => "udp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Command-line values override the file, which overrides defaults.
    fn workload(&self, file: &LoadgenConfig) -> Workload {
        match self.mode {
            Mode::Crypto => {
                let base = file.crypto_config();
                Workload::Crypto(CryptoConfig {
                    data_size: self.data_size.unwrap_or(base.data_size),
                    workers: self.workers.unwrap_or(base.workers),
                })
            }
            Mode::Udp => {
                let base = file.udp_config();
                Workload::Udp(UdpConfig {
                    target: self.target.clone().unwrap_or(base.target),
                    rate: self.rate.unwrap_or(base.rate),
                    workers: self.workers.unwrap_or(base.workers),
                })
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let file = LoadgenConfig::resolve(cli.config.as_deref())?;
    let workload = cli.workload(&file);
    workload
        .validate()
        .with_context(|| format!("invalid {} configuration", cli.mode.as_str()))?;

    let cancel = CancellationToken::new();
    shutdown::on_signal(cancel.clone());
    if let Some(duration) = cli.duration.or(file.run.duration) {
        shutdown::after(cancel.clone(), duration);
    }

    tracing::info!(mode = cli.mode.as_str(), workers = workload.workers(), "press Ctrl+C to stop");

    let stats = Arc::new(EngineStats::default());
    loadgen::run(&workload, cancel.clone(), &stats).await?;
    cancel.cancel();

    let summary = stats.snapshot();
    tracing::info!(
        workers = summary.workers_spawned,
        started = summary.workers_started,
        setup_failures = summary.setup_failures,
        operations = summary.operations,
        send_failures = summary.send_failures,
        "load test completed"
    );

    Ok(())
}
