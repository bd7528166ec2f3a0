//! Lifecycle coordinator for one emulator session.
//!
//! Drives the two-phase protocol over the configured instances:
//!
//! - **start**: dependency layers start concurrently, a layer at a time;
//!   the first failure aborts the remaining starts and tears down whatever
//!   already started, in reverse start order, before the error surfaces.
//! - **connect**: begins only after every start completed (a barrier), in
//!   start order; failures trigger the same reverse-order teardown.
//! - **stop**: strict reverse start order; stop errors are collected into
//!   a [`StopReport`], never allowed to abort the remaining teardown.
//!
//! A teardown request (OS signal, external token, or explicit `stop`) may
//! arrive at any point; in-flight phase work observes the session
//! cancellation token and yields.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use emukit_artifact::ArtifactStore;

use crate::context::{SessionCtx, Timeouts};
use crate::contracts::{Emulator, EmulatorKind, EndpointBinding};
use crate::directory::{EmulatorInfo, EndpointDirectory};
use crate::error::{ConnectError, SessionError, StartError, StopReport};
use crate::ports::PortArbiter;
use crate::registry::EmulatorRegistry;

/// Observable coordinator state.
///
/// `Failed` is transient: it is entered from `Starting`/`Connecting` and
/// immediately followed by `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Connecting,
    Running,
    Failed,
    Stopping,
    Stopped,
}

/// How the session run loop decides when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, teardown begins.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Owns the emulator set for one session and enforces the start → connect →
/// run → stop protocol.
pub struct Session<E: Emulator> {
    registry: EmulatorRegistry<E>,
    ctx: SessionCtx,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
    /// Indices into the registry, in start *completion* order.
    started: Mutex<Vec<usize>>,
    stop_errors: Mutex<Vec<(EmulatorKind, crate::error::StopError)>>,
}

impl<E: Emulator> Session<E> {
    #[must_use]
    pub fn new(registry: EmulatorRegistry<E>) -> Self {
        Self::with_options(registry, Timeouts::default(), ArtifactStore::new())
    }

    #[must_use]
    pub fn with_options(
        registry: EmulatorRegistry<E>,
        timeouts: Timeouts,
        artifacts: ArtifactStore,
    ) -> Self {
        let cancel = CancellationToken::new();
        let ctx = SessionCtx::new(
            Arc::new(PortArbiter::new()),
            Arc::new(EndpointDirectory::new()),
            Arc::new(artifacts),
            cancel.clone(),
            timeouts,
        );

        Self {
            registry,
            ctx,
            cancel,
            state: Mutex::new(SessionState::Idle),
            started: Mutex::new(Vec::new()),
            stop_errors: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Directory of live endpoints, for peer lookup and outside tooling.
    #[must_use]
    pub fn directory(&self) -> Arc<EndpointDirectory> {
        Arc::clone(self.ctx.directory())
    }

    /// Token that tears the session down when cancelled. Cloneable trigger
    /// for tests and embedders.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Full cycle: start + connect, wait for shutdown, stop.
    ///
    /// # Errors
    /// Propagates the first start/connect failure after teardown completed.
    pub async fn run(&self, shutdown: ShutdownOptions) -> Result<StopReport, SessionError> {
        self.spawn_shutdown_waiter(shutdown);

        self.start().await?;

        if self.state() == SessionState::Running {
            self.cancel.cancelled().await;
        }

        Ok(self.stop().await)
    }

    /// Drive the session to `Running`: start phase, connect barrier,
    /// connect phase.
    ///
    /// If the session token is cancelled mid-phase this returns `Ok(())`
    /// with the session already torn down (`Stopped`); callers distinguish
    /// the two outcomes through [`state`](Session::state).
    ///
    /// # Errors
    /// The first `StartError`/`ConnectError`, wrapped in [`SessionError`].
    /// Teardown of every already-started instance has completed by the
    /// time the error is returned.
    pub async fn start(&self) -> Result<(), SessionError> {
        {
            let mut st = self.state.lock();
            if *st != SessionState::Idle {
                return Err(SessionError::AlreadyStarted);
            }
            *st = SessionState::Starting;
        }

        tracing::info!(emulators = ?self.registry.kinds(), "Phase: start");
        match self.run_start_phase().await {
            Err(e) => {
                *self.state.lock() = SessionState::Failed;
                tracing::error!(error = %e, "start phase failed, tearing down");
                self.teardown().await;
                return Err(e);
            }
            Ok(false) => {
                tracing::info!("start phase interrupted, tearing down");
                self.teardown().await;
                return Ok(());
            }
            Ok(true) => {}
        }

        *self.state.lock() = SessionState::Connecting;
        tracing::info!("Phase: connect");
        match self.run_connect_phase().await {
            Err(e) => {
                *self.state.lock() = SessionState::Failed;
                tracing::error!(error = %e, "connect phase failed, tearing down");
                self.teardown().await;
                return Err(e);
            }
            Ok(false) => {
                tracing::info!("connect phase interrupted, tearing down");
                self.teardown().await;
                return Ok(());
            }
            Ok(true) => {}
        }

        *self.state.lock() = SessionState::Running;
        tracing::info!("emulator suite running");
        Ok(())
    }

    /// Tear everything down and report collected stop errors. Idempotent;
    /// safe to call on a session that never started.
    pub async fn stop(&self) -> StopReport {
        self.teardown().await;
        StopReport {
            errors: std::mem::take(&mut *self.stop_errors.lock()),
        }
    }

    fn spawn_shutdown_waiter(&self, shutdown: ShutdownOptions) {
        let cancel = self.cancel.clone();
        match shutdown {
            ShutdownOptions::Signals => {
                tokio::spawn(async move {
                    match crate::shutdown::wait_for_shutdown().await {
                        Ok(()) => {
                            tracing::info!("shutdown: signal received");
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                "shutdown: primary waiter failed; falling back to ctrl_c()"
                            );
                            let _ = tokio::signal::ctrl_c().await;
                        }
                    }
                    cancel.cancel();
                });
            }
            ShutdownOptions::Token(token) => {
                tokio::spawn(async move {
                    token.cancelled().await;
                    cancel.cancel();
                });
            }
            ShutdownOptions::Future(fut) => {
                tokio::spawn(async move {
                    fut.await;
                    tracing::info!("shutdown: external future completed");
                    cancel.cancel();
                });
            }
        }
    }

    /// Start every layer; within a layer instances start concurrently.
    /// `Ok(false)` means the phase was interrupted by cancellation.
    async fn run_start_phase(&self) -> Result<bool, SessionError> {
        let mut first_err: Option<(EmulatorKind, StartError)> = None;

        'layers: for layer in self.registry.layers() {
            if self.cancel.is_cancelled() {
                break 'layers;
            }

            let mut set: JoinSet<(usize, Result<EndpointBinding, StartError>)> = JoinSet::new();
            for &idx in layer {
                let emulator = Arc::clone(&self.registry.entries()[idx]);
                let ctx = self.ctx.clone();
                let cancel = self.cancel.clone();
                set.spawn(async move {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => (idx, Err(StartError::Cancelled)),
                        res = emulator.start(&ctx) => (idx, res),
                    }
                });
            }

            while let Some(joined) = set.join_next().await {
                let Ok((idx, res)) = joined else {
                    tracing::error!("emulator start task failed to join");
                    continue;
                };
                let kind = self.registry.entries()[idx].kind();
                match res {
                    Ok(binding) => {
                        tracing::info!(emulator = %kind, addr = %binding, "emulator started");
                        self.ctx
                            .directory()
                            .register(EmulatorInfo::new(kind, binding));
                        self.started.lock().push(idx);
                    }
                    Err(StartError::Cancelled) => {
                        tracing::debug!(emulator = %kind, "start cancelled");
                    }
                    Err(e) => {
                        if first_err.is_none() {
                            tracing::error!(
                                emulator = %kind,
                                error = %e,
                                "emulator failed to start, aborting remaining starts"
                            );
                            first_err = Some((kind, e));
                            // Abort in-flight siblings and later layers.
                            self.cancel.cancel();
                        } else {
                            tracing::warn!(emulator = %kind, error = %e, "additional start failure");
                        }
                    }
                }
            }

            if first_err.is_some() {
                break 'layers;
            }
        }

        if let Some((kind, source)) = first_err {
            return Err(SessionError::Start { kind, source });
        }
        Ok(!self.cancel.is_cancelled())
    }

    /// Connect every started instance, in start order. Runs only after the
    /// start barrier. `Ok(false)` means interrupted by cancellation.
    async fn run_connect_phase(&self) -> Result<bool, SessionError> {
        let order = self.started.lock().clone();

        for idx in order {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let emulator = &self.registry.entries()[idx];
            let kind = emulator.kind();
            let res = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(ConnectError::Cancelled),
                res = emulator.connect(&self.ctx) => res,
            };

            match res {
                Ok(()) => {
                    self.ctx.directory().mark_ready(kind);
                    tracing::info!(emulator = %kind, "emulator connected");
                }
                Err(ConnectError::Cancelled) => return Ok(false),
                Err(source) => return Err(SessionError::Connect { kind, source }),
            }
        }
        Ok(true)
    }

    /// Stop started instances in reverse start order, then sweep the rest.
    async fn teardown(&self) {
        {
            let mut st = self.state.lock();
            match *st {
                SessionState::Stopped | SessionState::Stopping => return,
                _ => *st = SessionState::Stopping,
            }
        }

        tracing::info!("Phase: stop");
        self.cancel.cancel();

        let order: Vec<usize> = {
            let mut started = self.started.lock();
            let order = started.clone();
            started.clear();
            order
        };

        for &idx in order.iter().rev() {
            let emulator = &self.registry.entries()[idx];
            let kind = emulator.kind();
            tracing::debug!(emulator = %kind, "stopping emulator");
            if let Err(err) = emulator.stop().await {
                tracing::warn!(emulator = %kind, error = %err, "emulator failed to stop cleanly");
                self.stop_errors.lock().push((kind, err));
            }
            self.ctx.directory().remove(kind);
        }

        // Instances that never completed start: stop must be a cheap no-op
        // but may still release partially-acquired resources.
        for (idx, emulator) in self.registry.entries().iter().enumerate() {
            if order.contains(&idx) {
                continue;
            }
            if let Err(err) = emulator.stop().await {
                self.stop_errors.lock().push((emulator.kind(), err));
            }
        }

        *self.state.lock() = SessionState::Stopped;
        tracing::info!("all emulators stopped");
    }
}
