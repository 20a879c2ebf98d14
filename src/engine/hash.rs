//! SHA-256 stress workload.
//!
//! One input buffer is allocated per run and shared read-only by every
//! worker.  Each worker hashes it in a tight loop on its own named OS thread
//! (`hash-<index>`), polling the cancellation token between digests.

use std::hint::black_box;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::EngineStats;

/// Digests computed between flushes of the local counter into [`EngineStats`].
const STATS_FLUSH_EVERY: u64 = 1024;

/// Build the shared input: `data_size` bytes of a repeating `0..=255` ramp.
pub fn input_buffer(data_size: usize) -> Arc<[u8]> {
    (0..data_size).map(|i| i as u8).collect()
}

/// One SHA-256 digest of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hash `data` until `cancel` fires.  Runs on its own OS thread.
pub(crate) fn hash_worker(
    index: usize,
    data: Arc<[u8]>,
    cancel: CancellationToken,
    stats: Arc<EngineStats>,
) {
    stats.workers_started.fetch_add(1, Ordering::Relaxed);
    debug!(worker = index, bytes = data.len(), "hash worker started");

    let mut pending: u64 = 0;
    while !cancel.is_cancelled() {
        black_box(digest(black_box(&data)));
        pending += 1;
        if pending == STATS_FLUSH_EVERY {
            stats.operations.fetch_add(pending, Ordering::Relaxed);
            pending = 0;
        }
    }
    stats.operations.fetch_add(pending, Ordering::Relaxed);

    debug!(worker = index, "hash worker stopped");
}
