//! Hosting emulator: in-process static file server.
//!
//! No external binary here; the emulator binds the negotiated port itself
//! and serves the configured public directory until stop.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use emukit::context::SessionCtx;
use emukit::contracts::{Emulator, EmulatorKind, EndpointBinding};
use emukit::error::{ConnectError, StartError, StopError};
use emukit::ports::PortReservation;

use crate::{SuiteSettings, default_enabled};

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostingConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Directory served at `/`.
    pub public_dir: PathBuf,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: None,
            port: None,
            public_dir: default_public_dir(),
        }
    }
}

struct RunningHosting {
    shutdown: CancellationToken,
    server: JoinHandle<Result<(), std::io::Error>>,
    _reservation: PortReservation,
    stop_grace: Duration,
}

pub struct HostingEmulator {
    config: HostingConfig,
    default_host: String,
    state: Mutex<Option<RunningHosting>>,
}

impl HostingEmulator {
    #[must_use]
    pub fn new(config: HostingConfig, settings: &SuiteSettings) -> Self {
        Self {
            config,
            default_host: settings.host.clone(),
            state: Mutex::new(None),
        }
    }

    fn bind_host(&self) -> String {
        self.config
            .host
            .clone()
            .unwrap_or_else(|| self.default_host.clone())
    }
}

#[async_trait]
impl Emulator for HostingEmulator {
    fn kind(&self) -> EmulatorKind {
        EmulatorKind::Hosting
    }

    async fn start(&self, ctx: &SessionCtx) -> Result<EndpointBinding, StartError> {
        if self.state.lock().is_some() {
            return Err(StartError::AlreadyStarted);
        }

        if !self.config.public_dir.is_dir() {
            tracing::warn!(
                public_dir = %self.config.public_dir.display(),
                "hosting public directory does not exist, serving 404s"
            );
        }

        let host = self.bind_host();
        let reservation = ctx.ports().reserve(&host, self.config.port).await?;
        let binding = EndpointBinding::new(host, reservation.port());

        let listener = tokio::net::TcpListener::bind(binding.addr())
            .await
            .map_err(|source| StartError::Bind {
                addr: binding.addr(),
                source,
            })?;

        let router = Router::new().fallback_service(ServeDir::new(&self.config.public_dir));

        // Own token so this instance can stop independently of the session.
        let shutdown = CancellationToken::new();
        let graceful = shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
        });

        tracing::info!(
            addr = %binding,
            public_dir = %self.config.public_dir.display(),
            "hosting emulator serving"
        );

        *self.state.lock() = Some(RunningHosting {
            shutdown,
            server,
            _reservation: reservation,
            stop_grace: ctx.timeouts().stop_grace,
        });
        Ok(binding)
    }

    async fn connect(&self, _ctx: &SessionCtx) -> Result<(), ConnectError> {
        // Static content only; no peers to resolve.
        Ok(())
    }

    async fn stop(&self) -> Result<(), StopError> {
        let Some(running) = self.state.lock().take() else {
            return Ok(());
        };

        running.shutdown.cancel();
        match tokio::time::timeout(running.stop_grace, running.server).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(source))) => Err(StopError::Io {
                context: "hosting server error during shutdown".to_owned(),
                source,
            }),
            Ok(Err(join_err)) => Err(StopError::Task {
                message: join_err.to_string(),
            }),
            Err(_) => Err(StopError::Task {
                message: "hosting server did not shut down within the grace period".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config: HostingConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(config.enabled);
        assert_eq!(config.public_dir, PathBuf::from("public"));
        assert!(config.port.is_none());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let emulator = HostingEmulator::new(HostingConfig::default(), &SuiteSettings::default());
        emulator.stop().await.unwrap();
    }
}
