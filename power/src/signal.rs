use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Resolves on the first Ctrl+C, or SIGTERM on unix.
///
/// # Errors
///
/// Returns the error if a signal handler cannot be installed.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        res = ctrl_c => res,
        res = terminate => res,
    }
}

/// Cancels `token` once, on the first shutdown signal.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = shutdown_signal() => {
                if let Err(e) = res {
                    tracing::error!("failed to listen for shutdown signals: {e}");
                    return;
                }
                tracing::info!("shutdown signal received");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    })
}
