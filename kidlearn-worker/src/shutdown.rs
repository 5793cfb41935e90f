//! Signal handling for graceful shutdown.

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C). Handlers are installed before the
/// future is returned, so a signal arriving before the first poll is kept.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    })
}

/// Spawns a task that flips the returned token to `true` on the first
/// SIGTERM or SIGINT.
pub fn spawn_shutdown_listener() -> std::io::Result<watch::Receiver<bool>> {
    let signal = shutdown_signal()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        signal.await;
        if shutdown_tx.send(true).is_err() {
            tracing::debug!("Shutdown token has no listeners");
        }
    });

    Ok(shutdown_rx)
}
