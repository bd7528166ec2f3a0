//! TCP readiness probing.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Result of waiting for an endpoint to accept connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Listening,
    TimedOut,
    Cancelled,
}

/// Single-shot check that a TCP endpoint accepts connections.
pub async fn check_tcp(addr: &str) -> bool {
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!(addr, error = %e, "tcp probe refused");
            false
        }
        Err(_) => {
            tracing::debug!(addr, "tcp probe timed out");
            false
        }
    }
}

/// Poll `addr` until it accepts a TCP connection, the deadline passes, or
/// the token is cancelled.
pub async fn wait_until_listening(
    addr: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return ProbeOutcome::Cancelled;
        }
        if check_tcp(addr).await {
            return ProbeOutcome::Listening;
        }
        if tokio::time::Instant::now() >= deadline {
            return ProbeOutcome::TimedOut;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return ProbeOutcome::Cancelled,
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}
