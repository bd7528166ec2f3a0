//! Java-based external-process emulators (database and firestore).
//!
//! Both cloud services ship their local emulators as versioned jars; the
//! wrapper resolves the jar through the artifact cache, launches it with a
//! negotiated host/port pair, and supervises the child until stop.

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

/// Configuration for a Java-based emulator.
///
/// Either `jar` (a pre-downloaded jar on disk) or `artifact` (download
/// coordinates) must be set; `jar` wins when both are present.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JavaEmulatorConfig {
    pub enabled: bool,
    /// Bind host; falls back to the suite-wide default.
    pub host: Option<String>,
    /// Fixed port; `None` lets the session pick a free one.
    pub port: Option<u16>,
    /// Local jar override, skips the artifact cache entirely.
    pub jar: Option<PathBuf>,
    pub artifact: Option<ArtifactSource>,
    pub java_path: Option<PathBuf>,
    pub jvm_args: Vec<String>,
}

impl Default for JavaEmulatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: None,
            port: None,
            jar: None,
            artifact: None,
            java_path: None,
            jvm_args: Vec::new(),
        }
    }
}

impl JavaEmulatorConfig {
    fn java_path(&self) -> PathBuf {
        self.java_path.clone().unwrap_or_else(|| PathBuf::from("java"))
    }
}

struct RunningJava {
    handle: ProcessHandle,
    _reservation: PortReservation,
    stop_grace: Duration,
}

/// External-process emulator wrapping a Java jar.
pub struct JavaEmulator {
    kind: EmulatorKind,
    config: JavaEmulatorConfig,
    default_host: String,
    cache_dir: PathBuf,
    state: Mutex<Option<RunningJava>>,
}

impl JavaEmulator {
    #[must_use]
    pub fn new(kind: EmulatorKind, config: JavaEmulatorConfig, settings: &SuiteSettings) -> Self {
        Self {
            kind,
            config,
            default_host: settings.host.clone(),
            cache_dir: settings.cache_dir.clone(),
            state: Mutex::new(None),
        }
    }

    fn bind_host(&self) -> String {
        self.config
            .host
            .clone()
            .unwrap_or_else(|| self.default_host.clone())
    }

    async fn resolve_jar(&self, ctx: &SessionCtx) -> Result<PathBuf, StartError> {
        if let Some(ref jar) = self.config.jar {
            return Ok(jar.clone());
        }
        // build_suite guarantees one of the two is present
        let source = self.config.artifact.as_ref().ok_or_else(|| StartError::Launch {
            program: format!("{}-emulator", self.kind),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no jar path or artifact coordinates configured",
            ),
        })?;

        let desc = source.descriptor(self.kind, &self.cache_dir);
        let path = ctx.artifacts().ensure_available(&desc).await?;
        Ok(path)
    }

    fn build_command(&self, jar: &Path, binding: &EndpointBinding) -> ProcessCommand {
        ProcessCommand::new(self.config.java_path())
            .args(self.config.jvm_args.clone())
            .arg("-jar")
            .arg(jar.display().to_string())
            .arg("--host")
            .arg(binding.host.clone())
            .arg("--port")
            .arg(binding.port.to_string())
    }
}

#[async_trait]
impl Emulator for JavaEmulator {
    fn kind(&self) -> EmulatorKind {
        self.kind
    }

    async fn start(&self, ctx: &SessionCtx) -> Result<EndpointBinding, StartError> {
        if self.state.lock().is_some() {
            return Err(StartError::AlreadyStarted);
        }

        let jar = self.resolve_jar(ctx).await?;

        let host = self.bind_host();
        let reservation = ctx.ports().reserve(&host, self.config.port).await?;
        let binding = EndpointBinding::new(host, reservation.port());

        let cmd = self.build_command(&jar, &binding);
        let handle = process::spawn(self.kind.as_str(), &cmd, ctx.cancel())?;

        let readiness = ctx.timeouts().readiness;
        match probe::wait_until_listening(&binding.addr(), readiness, ctx.cancel()).await {
            ProbeOutcome::Listening => {}
            ProbeOutcome::TimedOut => {
                handle.stop(ctx.timeouts().stop_grace).await;
                return Err(StartError::NotListening {
                    kind: self.kind,
                    addr: binding.addr(),
                    waited: readiness,
                });
            }
            ProbeOutcome::Cancelled => {
                handle.stop(ctx.timeouts().stop_grace).await;
                return Err(StartError::Cancelled);
            }
        }

        *self.state.lock() = Some(RunningJava {
            handle,
            _reservation: reservation,
            stop_grace: ctx.timeouts().stop_grace,
        });
        Ok(binding)
    }

    async fn connect(&self, _ctx: &SessionCtx) -> Result<(), ConnectError> {
        // Serves its peers; nothing to register on its side.
        tracing::debug!(emulator = %self.kind, "no peers to connect");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StopError> {
        let Some(running) = self.state.lock().take() else {
            return Ok(());
        };
        running.handle.stop(running.stop_grace).await;
        Ok(())
    }
}
