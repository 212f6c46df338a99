//! Turning process signals into cancellation
use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wait for an interrupt or termination request
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

/// Cancel `token` when the process is asked to stop.
///
/// The listener also ends, without cancelling, if the token is cancelled
/// elsewhere first.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = shutdown_signal() => token.cancel(),
        }
    })
}
