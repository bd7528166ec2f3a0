//! Error taxonomy for the emulator runtime.
//!
//! Start and connect failures abort the session start phase and propagate.
//! Stop errors are collected into a [`StopReport`] and never abort the
//! teardown of remaining instances.

use std::time::Duration;

use crate::contracts::EmulatorKind;

/// Failure to bring a single emulator instance up.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    #[error("instance is already running")]
    AlreadyStarted,
    #[error("port {port} is already reserved by another emulator in this session")]
    PortReserved { port: u16 },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("emulator artifact unavailable: {0}")]
    Artifact(#[from] emukit_artifact::ArtifactError),
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{kind} emulator not listening on {addr} after {waited:?}")]
    NotListening {
        kind: EmulatorKind,
        addr: String,
        waited: Duration,
    },
    #[error("start interrupted by session teardown")]
    Cancelled,
}

/// Failure to cross-register with sibling instances after all starts
/// completed.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("connect called before start completed")]
    NotStarted,
    #[error("required peer {peer} is not registered in the session")]
    MissingPeer { peer: EmulatorKind },
    #[error("peer {peer} at {addr} unreachable after {waited:?}")]
    PeerUnreachable {
        peer: EmulatorKind,
        addr: String,
        waited: Duration,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect interrupted by session teardown")]
    Cancelled,
}

/// Non-fatal teardown failure. Collected, never thrown across the session.
#[derive(thiserror::Error, Debug)]
pub enum StopError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("emulator task did not shut down cleanly: {message}")]
    Task { message: String },
}

/// Invalid emulator set handed to the registry.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("no emulators configured for this session")]
    Empty,
    #[error("emulator kind {kind} registered more than once")]
    Duplicate { kind: EmulatorKind },
    #[error("{kind} depends on {dep}, which is not part of this session")]
    UnknownDependency {
        kind: EmulatorKind,
        dep: EmulatorKind,
    },
    #[error("dependency cycle involving {kind}")]
    Cycle { kind: EmulatorKind },
}

/// Session-level failure surfaced by the lifecycle coordinator.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,
    #[error("failed to start {kind} emulator: {source}")]
    Start {
        kind: EmulatorKind,
        #[source]
        source: StartError,
    },
    #[error("failed to connect {kind} emulator: {source}")]
    Connect {
        kind: EmulatorKind,
        #[source]
        source: ConnectError,
    },
}

/// Outcome of a teardown pass: every stop error, none of them fatal.
#[derive(Debug, Default)]
pub struct StopReport {
    pub errors: Vec<(EmulatorKind, StopError)>,
}

impl StopReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn record(&mut self, kind: EmulatorKind, error: StopError) {
        self.errors.push((kind, error));
    }
}

impl std::fmt::Display for StopReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("all emulators stopped cleanly");
        }
        write!(f, "{} emulator(s) failed to stop cleanly:", self.errors.len())?;
        for (kind, err) in &self.errors {
            write!(f, " [{kind}: {err}]")?;
        }
        Ok(())
    }
}
