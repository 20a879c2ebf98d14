//! Turns process-level stop requests into a cancelled [`CancellationToken`].
//!
//! The engine only ever looks at the token.  Whatever should end a run
//! (Ctrl+C, SIGTERM, a `--duration` timer) is wired up here by the binary.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `cancel` on Ctrl+C or SIGTERM.
///
/// The listener task ends on its own once `cancel` fires for any other reason.
pub fn on_signal(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    })
}

/// Cancel `cancel` once `duration` has elapsed.
pub fn after(cancel: CancellationToken, duration: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!(duration = %humantime::format_duration(duration), "run duration reached, shutting down");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}
