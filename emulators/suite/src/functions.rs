//! Functions emulator: external process wrapping the functions runtime.
//!
//! Unlike the Java emulators it calls into its peers, so `connect` resolves
//! the configured dependencies from the endpoint directory, verifies each
//! one is reachable, and hands their addresses to the runtime through an
//! env-format handshake file in the working directory.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use emukit::context::SessionCtx;
use emukit::contracts::{Emulator, EmulatorKind, EndpointBinding};
use emukit::error::{ConnectError, StartError, StopError};
use emukit::ports::PortReservation;
use emukit::probe::{self, ProbeOutcome};
use emukit::process::{self, ProcessCommand, ProcessHandle};

use crate::{ArtifactSource, SuiteSettings, default_enabled};

/// Name of the handshake file the runtime reads peer addresses from.
pub const PEERS_FILE: &str = ".cumulus-peers.env";

fn default_depends_on() -> Vec<EmulatorKind> {
    vec![EmulatorKind::Database]
}

/// Configuration for the functions emulator. Either `runtime_bin` or
/// `artifact` must be set; `runtime_bin` wins when both are present.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FunctionsConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Local runtime binary, skips the artifact cache.
    pub runtime_bin: Option<PathBuf>,
    pub artifact: Option<ArtifactSource>,
    /// Extra arguments appended after `--host`/`--port`.
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Peers that must be started first and reachable at connect time.
    pub depends_on: Vec<EmulatorKind>,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: None,
            port: None,
            runtime_bin: None,
            artifact: None,
            args: Vec::new(),
            working_dir: None,
            depends_on: default_depends_on(),
        }
    }
}

struct RunningFunctions {
    handle: ProcessHandle,
    _reservation: PortReservation,
    stop_grace: Duration,
}

pub struct FunctionsEmulator {
    config: FunctionsConfig,
    default_host: String,
    cache_dir: PathBuf,
    state: Mutex<Option<RunningFunctions>>,
    peers: Mutex<HashMap<EmulatorKind, EndpointBinding>>,
}

impl FunctionsEmulator {
    #[must_use]
    pub fn new(config: FunctionsConfig, settings: &SuiteSettings) -> Self {
        Self {
            config,
            default_host: settings.host.clone(),
            cache_dir: settings.cache_dir.clone(),
            state: Mutex::new(None),
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Peer addresses resolved during the connect phase.
    #[must_use]
    pub fn peers(&self) -> HashMap<EmulatorKind, EndpointBinding> {
        self.peers.lock().clone()
    }

    fn bind_host(&self) -> String {
        self.config
            .host
            .clone()
            .unwrap_or_else(|| self.default_host.clone())
    }

    fn working_dir(&self) -> PathBuf {
        self.config
            .working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    async fn resolve_binary(&self, ctx: &SessionCtx) -> Result<PathBuf, StartError> {
        if let Some(ref bin) = self.config.runtime_bin {
            return Ok(bin.clone());
        }
        let source = self.config.artifact.as_ref().ok_or_else(|| StartError::Launch {
            program: "functions-runtime".to_owned(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no runtime binary or artifact coordinates configured",
            ),
        })?;
        let desc = source.descriptor(EmulatorKind::Functions, &self.cache_dir);
        let path = ctx.artifacts().ensure_available(&desc).await?;
        Ok(path)
    }

    fn build_command(&self, binary: &Path, binding: &EndpointBinding) -> ProcessCommand {
        let mut cmd = ProcessCommand::new(binary)
            .arg("--host")
            .arg(binding.host.clone())
            .arg("--port")
            .arg(binding.port.to_string())
            .args(self.config.args.clone());
        if let Some(ref dir) = self.config.working_dir {
            cmd = cmd.current_dir(dir.clone());
        }
        cmd
    }
}

/// Render the handshake file contents: one `CUMULUS_<KIND>_EMULATOR_HOST`
/// line per peer, sorted for determinism.
fn render_peers_file(peers: &HashMap<EmulatorKind, EndpointBinding>) -> String {
    let mut entries: Vec<(&EmulatorKind, &EndpointBinding)> = peers.iter().collect();
    entries.sort_by_key(|(kind, _)| kind.as_str());

    let mut out = String::new();
    for (kind, binding) in entries {
        let _ = writeln!(
            out,
            "CUMULUS_{}_EMULATOR_HOST={}",
            kind.as_str().to_ascii_uppercase(),
            binding
        );
    }
    out
}

#[async_trait]
impl Emulator for FunctionsEmulator {
    fn kind(&self) -> EmulatorKind {
        EmulatorKind::Functions
    }

    fn dependencies(&self) -> &[EmulatorKind] {
        &self.config.depends_on
    }

    async fn start(&self, ctx: &SessionCtx) -> Result<EndpointBinding, StartError> {
        if self.state.lock().is_some() {
            return Err(StartError::AlreadyStarted);
        }

        let binary = self.resolve_binary(ctx).await?;

        let host = self.bind_host();
        let reservation = ctx.ports().reserve(&host, self.config.port).await?;
        let binding = EndpointBinding::new(host, reservation.port());

        let cmd = self.build_command(&binary, &binding);
        let handle = process::spawn(EmulatorKind::Functions.as_str(), &cmd, ctx.cancel())?;

        let readiness = ctx.timeouts().readiness;
        match probe::wait_until_listening(&binding.addr(), readiness, ctx.cancel()).await {
            ProbeOutcome::Listening => {}
            ProbeOutcome::TimedOut => {
                handle.stop(ctx.timeouts().stop_grace).await;
                return Err(StartError::NotListening {
                    kind: EmulatorKind::Functions,
                    addr: binding.addr(),
                    waited: readiness,
                });
            }
            ProbeOutcome::Cancelled => {
                handle.stop(ctx.timeouts().stop_grace).await;
                return Err(StartError::Cancelled);
            }
        }

        *self.state.lock() = Some(RunningFunctions {
            handle,
            _reservation: reservation,
            stop_grace: ctx.timeouts().stop_grace,
        });
        Ok(binding)
    }

    async fn connect(&self, ctx: &SessionCtx) -> Result<(), ConnectError> {
        if self.state.lock().is_none() {
            return Err(ConnectError::NotStarted);
        }

        let wait = ctx.timeouts().connect_wait;
        let mut resolved = HashMap::new();

        for peer in &self.config.depends_on {
            let binding = ctx
                .directory()
                .binding(*peer)
                .ok_or(ConnectError::MissingPeer { peer: *peer })?;

            match probe::wait_until_listening(&binding.addr(), wait, ctx.cancel()).await {
                ProbeOutcome::Listening => {}
                ProbeOutcome::TimedOut => {
                    return Err(ConnectError::PeerUnreachable {
                        peer: *peer,
                        addr: binding.addr(),
                        waited: wait,
                    });
                }
                ProbeOutcome::Cancelled => return Err(ConnectError::Cancelled),
            }

            tracing::debug!(peer = %peer, addr = %binding, "functions peer resolved");
            resolved.insert(*peer, binding);
        }

        let peers_path = self.working_dir().join(PEERS_FILE);
        std::fs::write(&peers_path, render_peers_file(&resolved)).map_err(|source| {
            ConnectError::Io {
                context: format!("failed to write {}", peers_path.display()),
                source,
            }
        })?;

        *self.peers.lock() = resolved;
        Ok(())
    }

    async fn stop(&self) -> Result<(), StopError> {
        let Some(running) = self.state.lock().take() else {
            return Ok(());
        };
        running.handle.stop(running.stop_grace).await;

        // Remove the handshake file so a later session cannot read stale
        // peer addresses.
        let peers_path = self.working_dir().join(PEERS_FILE);
        if peers_path.exists() {
            if let Err(e) = std::fs::remove_file(&peers_path) {
                return Err(StopError::Io {
                    context: format!("failed to remove {}", peers_path.display()),
                    source: e,
                });
            }
        }

        self.peers.lock().clear();
        Ok(())
    }
}
