//! OS signal handling for session shutdown.

/// Wait for SIGINT or SIGTERM (Ctrl+C on non-Unix platforms).
///
/// # Errors
/// Returns an error if the signal handlers cannot be installed; callers
/// fall back to `tokio::signal::ctrl_c`.
#[cfg(unix)]
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => {
            tracing::debug!("SIGINT received");
        }
        _ = terminate.recv() => {
            tracing::debug!("SIGTERM received");
        }
    }
    Ok(())
}

/// Wait for Ctrl+C.
///
/// # Errors
/// Returns an error if the handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
