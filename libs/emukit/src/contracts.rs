use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::SessionCtx;
use crate::error::{ConnectError, StartError, StopError};

/// Service category an emulator stands in for. Stable identity, used as a
/// map key throughout the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmulatorKind {
    Database,
    Firestore,
    Functions,
    Hosting,
}

impl EmulatorKind {
    pub const ALL: [EmulatorKind; 4] = [
        EmulatorKind::Database,
        EmulatorKind::Firestore,
        EmulatorKind::Functions,
        EmulatorKind::Hosting,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EmulatorKind::Database => "database",
            EmulatorKind::Firestore => "firestore",
            EmulatorKind::Functions => "functions",
            EmulatorKind::Hosting => "hosting",
        }
    }
}

impl std::fmt::Display for EmulatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network address an emulator instance is (or will be) reachable on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointBinding {
    pub host: String,
    pub port: u16,
}

impl EndpointBinding {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form suitable for `TcpStream::connect`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for EndpointBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle contract every emulator implementation honors.
///
/// The session drives each instance through
/// configured → started → connected → stopped:
///
/// - [`start`](Emulator::start) acquires a port, launches the underlying
///   process or server, and returns once the endpoint is listening. It must
///   not block on sibling instances.
/// - [`connect`](Emulator::connect) runs only after every sibling in the
///   session has completed `start`; this is where cross-instance
///   registration happens.
/// - [`stop`](Emulator::stop) releases the process/server and the port
///   reservation. It must be safe to call on a never-started or
///   partially-started instance and must not fail once resources are
///   already released.
///
/// Implementations are a closed set of tagged variants dispatched through
/// an enum, not an open plugin surface.
#[async_trait]
pub trait Emulator: Send + Sync + 'static {
    fn kind(&self) -> EmulatorKind;

    /// Kinds that must have completed `start` before this instance starts.
    fn dependencies(&self) -> &[EmulatorKind] {
        &[]
    }

    async fn start(&self, ctx: &SessionCtx) -> Result<EndpointBinding, StartError>;

    async fn connect(&self, ctx: &SessionCtx) -> Result<(), ConnectError>;

    async fn stop(&self) -> Result<(), StopError>;
}
