//! Session-wide port arbitration.
//!
//! Port reservation is a shared resource: two instances racing for the
//! same port would trade a clean config error for a flaky launch failure.
//! The arbiter serializes reservation decisions behind one async lock and
//! tracks every port handed out for the lifetime of its reservation guard.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StartError;

/// Attempts to find a free OS-assigned port before giving up. Only relevant
/// if the OS keeps handing back ports this session already reserved.
const EPHEMERAL_ATTEMPTS: u32 = 16;

#[derive(Default)]
struct Reserved {
    ports: Mutex<HashSet<u16>>,
}

/// Serializes port-reservation decisions for one session.
#[derive(Default)]
pub struct PortArbiter {
    reserved: Arc<Reserved>,
    decision: tokio::sync::Mutex<()>,
}

impl PortArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `preferred` on `host`, or an OS-assigned free port when
    /// `preferred` is `None`. The port is probed by binding a listener that
    /// is dropped again immediately; the reservation itself lives until the
    /// returned guard is dropped.
    ///
    /// # Errors
    /// `StartError::PortReserved` if the explicit port is already held by a
    /// sibling in this session; `StartError::Bind` if the OS refuses the
    /// bind (typically a conflict with an unrelated process).
    pub async fn reserve(
        &self,
        host: &str,
        preferred: Option<u16>,
    ) -> Result<PortReservation, StartError> {
        let _decision = self.decision.lock().await;

        match preferred {
            Some(port) => {
                if self.reserved.ports.lock().contains(&port) {
                    return Err(StartError::PortReserved { port });
                }
                probe_bind(host, port).await?;
                self.reserved.ports.lock().insert(port);
                Ok(PortReservation {
                    port,
                    reserved: Arc::clone(&self.reserved),
                })
            }
            None => {
                for _ in 0..EPHEMERAL_ATTEMPTS {
                    let port = probe_bind(host, 0).await?;
                    if self.reserved.ports.lock().insert(port) {
                        return Ok(PortReservation {
                            port,
                            reserved: Arc::clone(&self.reserved),
                        });
                    }
                }
                Err(StartError::Bind {
                    addr: format!("{host}:0"),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        "no free port available",
                    ),
                })
            }
        }
    }

    /// Number of ports currently held. Diagnostic only.
    #[must_use]
    pub fn reserved_count(&self) -> usize {
        self.reserved.ports.lock().len()
    }
}

async fn probe_bind(host: &str, port: u16) -> Result<u16, StartError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let bound = listener
        .local_addr()
        .map_err(|source| StartError::Bind { addr, source })?
        .port();
    Ok(bound)
}

/// Holds one reserved port; dropping it returns the port to the pool.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    reserved: Arc<Reserved>,
}

impl std::fmt::Debug for Reserved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reserved")
            .field("count", &self.ports.lock().len())
            .finish()
    }
}

impl PortReservation {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        self.reserved.ports.lock().remove(&self.port);
    }
}
