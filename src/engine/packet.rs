//! UDP flood workload.
//!
//! Every worker resolves the target and opens its own connected UDP socket.
//! A worker that cannot do so gives up quietly and the rest of the pool keeps
//! going.  Send errors (ICMP port unreachable surfacing as `ECONNREFUSED`,
//! full buffers, ...) are counted and otherwise ignored: the point is traffic
//! volume, not delivery.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::rate::Pacing;
use super::EngineStats;

/// Datagram body sent on every attempt.
pub const PAYLOAD: &[u8] = b"noise";

/// Resolve `target` and open a UDP socket connected to it.
pub async fn connect(target: &str) -> Result<UdpSocket> {
    let addr = tokio::net::lookup_host(target)
        .await
        .with_context(|| format!("failed to resolve {}", target))?
        .next()
        .with_context(|| format!("{} resolved to no addresses", target))?;

    let bind_addr: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind UDP socket on {}", bind_addr))?;
    socket
        .connect(addr)
        .await
        .with_context(|| format!("failed to connect UDP socket to {}", addr))?;
    Ok(socket)
}

/// Open a socket to `target` and send [`PAYLOAD`] until `cancel` fires.
pub(crate) async fn packet_worker(
    index: usize,
    target: Arc<str>,
    pacing: Pacing,
    cancel: CancellationToken,
    stats: Arc<EngineStats>,
) {
    let socket = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = connect(&target) => match result {
            Ok(socket) => socket,
            Err(e) => {
                stats.setup_failures.fetch_add(1, Ordering::Relaxed);
                warn!(worker = index, target = %target, error = %e, "worker setup failed, exiting");
                return;
            }
        },
    };

    stats.workers_started.fetch_add(1, Ordering::Relaxed);
    debug!(worker = index, target = %target, ?pacing, "packet worker started");

    match pacing {
        Pacing::Unlimited => send_unlimited(&socket, &cancel, &stats).await,
        Pacing::Every(interval) => send_paced(&socket, interval, &cancel, &stats).await,
    }

    debug!(worker = index, "packet worker stopped");
    // The socket closes when it drops here.
}

async fn send_unlimited(socket: &UdpSocket, cancel: &CancellationToken, stats: &EngineStats) {
    while !cancel.is_cancelled() {
        // An always-writable socket still yields once tokio's coop budget runs out.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = socket.send(PAYLOAD) => record_send(result, stats),
        }
    }
}

async fn send_paced(
    socket: &UdpSocket,
    interval: Duration,
    cancel: &CancellationToken,
    stats: &EngineStats,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick is immediate; consume it so sends start one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = socket.send(PAYLOAD) => result,
                };
                record_send(result, stats);
            }
        }
    }
}

fn record_send(result: std::io::Result<usize>, stats: &EngineStats) {
    match result {
        Ok(_) => stats.operations.fetch_add(1, Ordering::Relaxed),
        Err(_) => stats.send_failures.fetch_add(1, Ordering::Relaxed),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_unparseable_target() {
        assert!(connect("127.0.0.1:not-a-port").await.is_err());
    }

    #[tokio::test]
    async fn test_setup_failure_is_counted_not_raised() {
        let stats = Arc::new(EngineStats::default());
        packet_worker(
            0,
            Arc::from("127.0.0.1:not-a-port"),
            Pacing::Unlimited,
            CancellationToken::new(),
            stats.clone(),
        )
        .await;

        assert_eq!(stats.setup_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.operations.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_paced_worker_delivers_to_listener() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.expect("listener bind");
        let target: Arc<str> = Arc::from(listener.local_addr().expect("addr").to_string());

        let cancel = CancellationToken::new();
        let stats = Arc::new(EngineStats::default());
        let worker = tokio::spawn(packet_worker(
            0,
            target,
            Pacing::Every(Duration::from_millis(10)),
            cancel.clone(),
            stats.clone(),
        ));

        let mut buf = [0u8; 64];
        let (len, _from) = tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
            .await
            .expect("timeout waiting for packet")
            .expect("recv");
        assert_eq!(&buf[..len], PAYLOAD);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should stop promptly")
            .expect("worker should not panic");
        assert!(stats.operations.load(Ordering::Relaxed) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_paced_worker_spaces_sends_by_interval() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.expect("listener bind");
        let target: Arc<str> = Arc::from(listener.local_addr().expect("addr").to_string());

        let cancel = CancellationToken::new();
        let stats = Arc::new(EngineStats::default());
        let worker = tokio::spawn(packet_worker(
            0,
            target,
            Pacing::Every(Duration::from_millis(100)),
            cancel.clone(),
            stats.clone(),
        ));

        // Ticks land at ~100, 200 and 300ms.
        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should stop promptly")
            .expect("worker should not panic");

        let sent = stats.operations.load(Ordering::Relaxed);
        assert!(
            (2..=4).contains(&sent),
            "expected about 3 paced sends in 350ms, got {}",
            sent
        );

        let mut received = 0;
        let mut buf = [0u8; 64];
        while let Ok(Ok(_)) =
            tokio::time::timeout(Duration::from_millis(50), listener.recv_from(&mut buf)).await
        {
            received += 1;
        }
        assert_eq!(received, sent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unlimited_worker_ignores_send_errors() {
        // Find a port with nothing listening on it.
        let closed_port = {
            let scratch = UdpSocket::bind("127.0.0.1:0").await.expect("scratch bind");
            scratch.local_addr().expect("addr").port()
        };

        let cancel = CancellationToken::new();
        let stats = Arc::new(EngineStats::default());
        let worker = tokio::spawn(packet_worker(
            0,
            Arc::from(format!("127.0.0.1:{}", closed_port)),
            Pacing::Unlimited,
            cancel.clone(),
            stats.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should stop promptly")
            .expect("worker should not panic");

        let attempts = stats.operations.load(Ordering::Relaxed)
            + stats.send_failures.load(Ordering::Relaxed);
        assert!(attempts > 0, "worker should have attempted sends");
        assert_eq!(stats.setup_failures.load(Ordering::Relaxed), 0);
    }
}
