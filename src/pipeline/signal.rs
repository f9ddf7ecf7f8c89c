//! Shutdown signal handling.

use tracing::info;

/// Resolve when the process receives SIGINT, SIGTERM, or SIGQUIT.
///
/// The caller cancels the run's shutdown token when this returns; in-flight
/// partition work observes the token and stops at the next safe point.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("SIGQUIT handler");

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    info!(signal = name, "Shutdown signal received");
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(signal = "ctrl-c", "Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_shutdown_token_is_shared() {
        let shutdown = CancellationToken::new();
        let shutdown_for_job = shutdown.clone();

        shutdown.cancel();

        assert!(
            shutdown_for_job.is_cancelled(),
            "Shutdown token clones should share cancellation state"
        );
    }
}
