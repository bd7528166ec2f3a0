//! Per-session context handed to every emulator lifecycle call.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use emukit_artifact::ArtifactStore;

use crate::directory::EndpointDirectory;
use crate::ports::PortArbiter;

/// Deadlines and grace periods for one session. Defaults documented field
/// by field; override through configuration where the app exposes them.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// How long `start` waits for a launched endpoint to accept TCP
    /// connections. Default 30 s.
    pub readiness: Duration,
    /// How long `connect` waits for a required peer. Default 10 s.
    pub connect_wait: Duration,
    /// Grace period between SIGTERM and force-kill for one instance.
    /// Default 2 s.
    pub stop_grace: Duration,
    /// Grace period for whole-suite shutdown. Default 5 s.
    pub shutdown_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            readiness: Duration::from_secs(30),
            connect_wait: Duration::from_secs(10),
            stop_grace: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Shared runtime services an emulator needs while starting, connecting,
/// and stopping: the port arbiter, the endpoint directory, the artifact
/// store, the session cancellation token, and the session deadlines.
#[derive(Clone)]
pub struct SessionCtx {
    ports: Arc<PortArbiter>,
    directory: Arc<EndpointDirectory>,
    artifacts: Arc<ArtifactStore>,
    cancel: CancellationToken,
    timeouts: Timeouts,
}

impl SessionCtx {
    pub(crate) fn new(
        ports: Arc<PortArbiter>,
        directory: Arc<EndpointDirectory>,
        artifacts: Arc<ArtifactStore>,
        cancel: CancellationToken,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            ports,
            directory,
            artifacts,
            cancel,
            timeouts,
        }
    }

    #[must_use]
    pub fn ports(&self) -> &PortArbiter {
        &self.ports
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<EndpointDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Cancelled when the session is torn down; long-running lifecycle work
    /// must observe it.
    #[must_use]
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }
}
