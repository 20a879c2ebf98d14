//! Worker-pool engine for both load modes.
//!
//! [`run_crypto`] and [`run_udp`] validate their config, spawn exactly
//! `workers` units, and return only after every unit has exited.  Workers
//! stop when the caller cancels the [`CancellationToken`]; the engine never
//! installs signal handlers or timeouts of its own.
//!
//! Per-worker failures (socket setup, individual sends, even a panic) are
//! absorbed and show up only in [`EngineStats`].  An invalid config is
//! reported before anything spawns.  The only other error is the OS refusing
//! to start a hash thread, in which case the units already started are
//! stopped and joined before the error is returned.

pub mod hash;
pub mod packet;
pub mod rate;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{self, ConfigError, CryptoConfig, UdpConfig};
use rate::Pacing;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("failed to start worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// EngineStats
// ---------------------------------------------------------------------------

/// Counters updated by workers during a run.
///
/// Purely informational: nothing in the engine reads them back, and they
/// never turn a run into a failure.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub workers_spawned: AtomicU64,
    /// Workers that reached their send or hash loop.
    pub workers_started: AtomicU64,
    pub workers_exited: AtomicU64,
    /// Workers that could not open their socket and quit early.
    pub setup_failures: AtomicU64,
    /// Workers that panicked.
    pub worker_panics: AtomicU64,
    /// Digests computed (crypto) or datagrams sent (udp).
    pub operations: AtomicU64,
    pub send_failures: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub workers_spawned: u64,
    pub workers_started: u64,
    pub workers_exited: u64,
    pub setup_failures: u64,
    pub worker_panics: u64,
    pub operations: u64,
    pub send_failures: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_exited: self.workers_exited.load(Ordering::Relaxed),
            setup_failures: self.setup_failures.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
            operations: self.operations.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Crypto mode
// ---------------------------------------------------------------------------

/// Hash a shared buffer on `config.workers` threads until `cancel` fires.
pub async fn run_crypto(config: &CryptoConfig, cancel: CancellationToken) -> Result<(), EngineError> {
    run_crypto_with_stats(config, cancel, &Arc::new(EngineStats::default())).await
}

/// [`run_crypto`], recording progress into `stats`.
///
/// Each worker gets its own OS thread named `hash-<index>`; the loops never
/// finish on their own, so they stay off tokio's bounded blocking pool.
pub async fn run_crypto_with_stats(
    config: &CryptoConfig,
    cancel: CancellationToken,
    stats: &Arc<EngineStats>,
) -> Result<(), EngineError> {
    config::validate_crypto(config)?;

    let run_id = Uuid::new_v4();
    info!(
        run_id = %run_id,
        data_size = config.data_size,
        workers = config.workers,
        "starting crypto load"
    );
    let start = Instant::now();

    let data = hash::input_buffer(config.data_size);
    run_pool(config.workers, &cancel, stats, |pool, index, cancel| {
        let data = Arc::clone(&data);
        let stats = Arc::clone(stats);
        pool.spawn_thread(index, format!("hash-{}", index), move || {
            hash::hash_worker(index, data, cancel, stats)
        })
    })
    .await?;

    info!(
        run_id = %run_id,
        elapsed_sec = start.elapsed().as_secs_f64(),
        digests = stats.operations.load(Ordering::Relaxed),
        "crypto load stopped"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// UDP mode
// ---------------------------------------------------------------------------

/// Flood `config.target` from `config.workers` sockets until `cancel` fires.
pub async fn run_udp(config: &UdpConfig, cancel: CancellationToken) -> Result<(), EngineError> {
    run_udp_with_stats(config, cancel, &Arc::new(EngineStats::default())).await
}

/// [`run_udp`], recording progress into `stats`.
pub async fn run_udp_with_stats(
    config: &UdpConfig,
    cancel: CancellationToken,
    stats: &Arc<EngineStats>,
) -> Result<(), EngineError> {
    config::validate_udp(config)?;

    let run_id = Uuid::new_v4();
    let pacing = Pacing::new(config.rate, config.workers);
    info!(
        run_id = %run_id,
        target = %config.target,
        rate = config.rate,
        workers = config.workers,
        ?pacing,
        "starting UDP flood"
    );
    let start = Instant::now();

    let target: Arc<str> = Arc::from(config.target.as_str());
    run_pool(config.workers, &cancel, stats, |pool, index, cancel| {
        pool.spawn_task(packet::packet_worker(
            index,
            Arc::clone(&target),
            pacing,
            cancel,
            Arc::clone(stats),
        ));
        Ok(())
    })
    .await?;

    let snapshot = stats.snapshot();
    if snapshot.setup_failures > 0 {
        warn!(
            run_id = %run_id,
            failed = snapshot.setup_failures,
            workers = config.workers,
            "some workers never started sending"
        );
    }
    info!(
        run_id = %run_id,
        elapsed_sec = start.elapsed().as_secs_f64(),
        sent = snapshot.operations,
        send_failures = snapshot.send_failures,
        "UDP flood stopped"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// How a pool unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Clean,
    Panicked,
}

/// The units of one run, tracked until the join barrier.
struct Pool<'a> {
    units: JoinSet<Exit>,
    stats: &'a EngineStats,
}

impl<'a> Pool<'a> {
    fn new(stats: &'a EngineStats) -> Self {
        Self {
            units: JoinSet::new(),
            stats,
        }
    }

    /// Run `unit` as a tokio task.
    fn spawn_task<F>(&mut self, unit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.units.spawn(async move {
            unit.await;
            Exit::Clean
        });
        self.stats.workers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Run `unit` on a dedicated OS thread.  The thread reports its exit over
    /// a oneshot; a panic drops the sender unsent.
    fn spawn_thread<F>(&mut self, index: usize, name: String, unit: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                unit();
                let _ = done_tx.send(());
            })
            .map_err(|source| EngineError::Spawn { index, source })?;

        self.units.spawn(async move {
            match done_rx.await {
                Ok(()) => Exit::Clean,
                Err(_) => Exit::Panicked,
            }
        });
        self.stats.workers_spawned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Join barrier: wait until every unit has exited.
    async fn join(mut self) {
        while let Some(result) = self.units.join_next().await {
            self.stats.workers_exited.fetch_add(1, Ordering::Relaxed);
            match result {
                Ok(Exit::Clean) => {}
                Ok(Exit::Panicked) => self.record_panic("worker thread panicked"),
                Err(e) if e.is_panic() => self.record_panic("worker task panicked"),
                Err(e) => debug!(error = %e, "worker task cancelled"),
            }
        }
    }

    fn record_panic(&self, what: &'static str) {
        self.stats.worker_panics.fetch_add(1, Ordering::Relaxed);
        warn!("{}", what);
    }
}

/// Spawn `count` units with `spawn_unit`, then wait for all of them.
///
/// Units watch a child of `cancel`: dropping this future (or a failed spawn)
/// stops them without cancelling anything the caller owns.
async fn run_pool<F>(
    count: usize,
    cancel: &CancellationToken,
    stats: &EngineStats,
    mut spawn_unit: F,
) -> Result<(), EngineError>
where
    F: FnMut(&mut Pool<'_>, usize, CancellationToken) -> Result<(), EngineError>,
{
    let cancel = cancel.child_token();
    let _stop_on_drop = cancel.clone().drop_guard();

    let mut pool = Pool::new(stats);
    for index in 0..count {
        if let Err(e) = spawn_unit(&mut pool, index, cancel.clone()) {
            warn!(worker = index, error = %e, "aborting launch, stopping started workers");
            cancel.cancel();
            pool.join().await;
            return Err(e);
        }
    }

    pool.join().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
