#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Tests for the lifecycle coordinator: phase ordering, dependency-grouped
//! concurrent starts, failure teardown, and cancellation.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use emukit::ports::PortReservation;
use emukit::{
    ConnectError, Emulator, EmulatorKind, EmulatorRegistry, EndpointBinding, Session, SessionCtx,
    SessionError, SessionState, ShutdownOptions, StartError, StopError,
};

type CallTracker = Arc<Mutex<Vec<String>>>;

struct MockEmulator {
    kind: EmulatorKind,
    deps: Vec<EmulatorKind>,
    calls: CallTracker,
    start_delay: Duration,
    fail_start: AtomicBool,
    fail_connect: AtomicBool,
    fail_stop: AtomicBool,
    reservation: Mutex<Option<PortReservation>>,
}

impl MockEmulator {
    fn new(kind: EmulatorKind, calls: &CallTracker) -> Self {
        Self {
            kind,
            deps: Vec::new(),
            calls: Arc::clone(calls),
            start_delay: Duration::from_millis(5),
            fail_start: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            reservation: Mutex::new(None),
        }
    }

    fn depends_on(mut self, deps: &[EmulatorKind]) -> Self {
        self.deps = deps.to_vec();
        self
    }

    fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    fn fail_start(self) -> Self {
        self.fail_start.store(true, Ordering::SeqCst);
        self
    }

    fn fail_connect(self) -> Self {
        self.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    fn fail_stop(self) -> Self {
        self.fail_stop.store(true, Ordering::SeqCst);
        self
    }

    fn record(&self, call: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{call}:{}", self.kind));
    }
}

#[async_trait]
impl Emulator for MockEmulator {
    fn kind(&self) -> EmulatorKind {
        self.kind
    }

    fn dependencies(&self) -> &[EmulatorKind] {
        &self.deps
    }

    async fn start(&self, ctx: &SessionCtx) -> Result<EndpointBinding, StartError> {
        tokio::time::sleep(self.start_delay).await;

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(StartError::Launch {
                program: format!("{}-emulator", self.kind),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
            });
        }

        let reservation = ctx.ports().reserve("127.0.0.1", None).await?;
        let binding = EndpointBinding::new("127.0.0.1", reservation.port());
        *self.reservation.lock().unwrap() = Some(reservation);

        self.record("start");
        Ok(binding)
    }

    async fn connect(&self, ctx: &SessionCtx) -> Result<(), ConnectError> {
        for dep in &self.deps {
            if ctx.directory().get(*dep).is_none() {
                return Err(ConnectError::MissingPeer { peer: *dep });
            }
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectError::Io {
                context: "scripted connect failure".to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        self.record("connect");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StopError> {
        self.record("stop");
        self.reservation.lock().unwrap().take();

        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(StopError::Task {
                message: "scripted stop failure".to_owned(),
            });
        }
        Ok(())
    }
}

fn calls_of(tracker: &CallTracker) -> Vec<String> {
    tracker.lock().unwrap().clone()
}

/// DB and HOSTING are independent, FUNCTIONS depends on DB. DB is slower
/// than HOSTING, so the deterministic completion order is
/// hosting, database, functions.
fn three_emulator_registry(calls: &CallTracker) -> EmulatorRegistry<MockEmulator> {
    EmulatorRegistry::build(vec![
        Arc::new(
            MockEmulator::new(EmulatorKind::Database, calls)
                .start_delay(Duration::from_millis(60)),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Functions, calls)
                .depends_on(&[EmulatorKind::Database]),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Hosting, calls).start_delay(Duration::from_millis(5)),
        ),
    ])
    .unwrap()
}

#[tokio::test]
async fn full_lifecycle_runs_phases_in_order() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    assert_eq!(session.state(), SessionState::Idle);
    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);

    let report = session.stop().await;
    assert!(report.is_clean());
    assert_eq!(session.state(), SessionState::Stopped);

    let calls = calls_of(&calls);
    assert_eq!(
        calls,
        vec![
            "start:hosting",
            "start:database",
            "start:functions",
            "connect:hosting",
            "connect:database",
            "connect:functions",
            "stop:functions",
            "stop:database",
            "stop:hosting",
        ]
    );
}

#[tokio::test]
async fn connect_never_begins_before_every_start_completed() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    session.start().await.unwrap();

    let calls = calls_of(&calls);
    let last_start = calls
        .iter()
        .rposition(|c| c.starts_with("start:"))
        .unwrap();
    let first_connect = calls
        .iter()
        .position(|c| c.starts_with("connect:"))
        .unwrap();
    assert!(
        last_start < first_connect,
        "connect began before all starts completed: {calls:?}"
    );

    session.stop().await;
}

#[tokio::test]
async fn stop_order_is_reverse_start_order() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    session.start().await.unwrap();
    session.stop().await;

    let calls = calls_of(&calls);
    let starts: Vec<&str> = calls
        .iter()
        .filter_map(|c| c.strip_prefix("start:"))
        .collect();
    let stops: Vec<&str> = calls
        .iter()
        .filter_map(|c| c.strip_prefix("stop:"))
        .collect();

    let mut reversed = starts.clone();
    reversed.reverse();
    assert_eq!(stops, reversed);
}

#[tokio::test]
async fn dependent_start_failure_stops_started_instances_first() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let registry = EmulatorRegistry::build(vec![
        Arc::new(
            MockEmulator::new(EmulatorKind::Database, &calls)
                .start_delay(Duration::from_millis(40)),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Functions, &calls)
                .depends_on(&[EmulatorKind::Database])
                .fail_start(),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Hosting, &calls).start_delay(Duration::from_millis(5)),
        ),
    ])
    .unwrap();
    let session = Session::new(registry);

    let err = session.start().await.unwrap_err();
    assert!(
        matches!(
            err,
            SessionError::Start {
                kind: EmulatorKind::Functions,
                source: StartError::Launch { .. },
            }
        ),
        "got {err:?}"
    );
    assert_eq!(session.state(), SessionState::Stopped);

    let calls = calls_of(&calls);
    // Both independent instances started, then were stopped in reverse
    // start order once the dependent instance failed. The trailing stop is
    // the best-effort sweep over the instance that never started.
    assert_eq!(
        calls,
        vec![
            "start:hosting",
            "start:database",
            "stop:database",
            "stop:hosting",
            "stop:functions",
        ]
    );
}

#[tokio::test]
async fn connect_failure_tears_everything_down() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let registry = EmulatorRegistry::build(vec![
        Arc::new(
            MockEmulator::new(EmulatorKind::Database, &calls)
                .start_delay(Duration::from_millis(30)),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Functions, &calls)
                .depends_on(&[EmulatorKind::Database])
                .fail_connect(),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Hosting, &calls).start_delay(Duration::from_millis(5)),
        ),
    ])
    .unwrap();
    let session = Session::new(registry);

    let err = session.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Connect {
            kind: EmulatorKind::Functions,
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Stopped);

    let calls = calls_of(&calls);
    let stops: Vec<&str> = calls
        .iter()
        .filter_map(|c| c.strip_prefix("stop:"))
        .collect();
    assert_eq!(stops, vec!["functions", "database", "hosting"]);
}

#[tokio::test]
async fn stop_without_start_is_safe_and_clean() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    let report = tokio::time::timeout(Duration::from_secs(1), session.stop())
        .await
        .expect("stop of an idle session must not block");

    assert!(report.is_clean());
    assert_eq!(session.state(), SessionState::Stopped);
    // No instance ever started, so nothing was in the reverse-order list;
    // the sweep still called best-effort stop on each configured instance.
    assert!(calls_of(&calls).iter().all(|c| c.starts_with("stop:")));
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    session.start().await.unwrap();
    let err = session.start().await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyStarted));

    session.stop().await;
}

#[tokio::test]
async fn stop_errors_are_collected_not_thrown() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let registry = EmulatorRegistry::build(vec![
        Arc::new(
            MockEmulator::new(EmulatorKind::Database, &calls)
                .start_delay(Duration::from_millis(20))
                .fail_stop(),
        ),
        Arc::new(MockEmulator::new(EmulatorKind::Hosting, &calls)),
    ])
    .unwrap();
    let session = Session::new(registry);

    session.start().await.unwrap();
    let report = session.stop().await;

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, EmulatorKind::Database);

    // Database started last, so its failing stop ran first; the failure
    // did not prevent the sibling from being stopped afterwards.
    let stops: Vec<String> = calls_of(&calls)
        .into_iter()
        .filter(|c| c.starts_with("stop:"))
        .collect();
    assert_eq!(stops, vec!["stop:database", "stop:hosting"]);
}

#[tokio::test]
async fn cancellation_interrupts_an_inflight_start() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let registry = EmulatorRegistry::build(vec![
        Arc::new(
            MockEmulator::new(EmulatorKind::Database, &calls).start_delay(Duration::from_secs(30)),
        ),
        Arc::new(
            MockEmulator::new(EmulatorKind::Hosting, &calls).start_delay(Duration::from_millis(5)),
        ),
    ])
    .unwrap();
    let session = Arc::new(Session::new(registry));

    let handle = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.start().await })
    };

    // Give hosting time to start, then tear down while database is still
    // sleeping in its start.
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.cancel_token().cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("cancellation must interrupt the in-flight start")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(session.state(), SessionState::Stopped);

    let calls = calls_of(&calls);
    assert!(calls.contains(&"start:hosting".to_owned()));
    assert!(!calls.contains(&"start:database".to_owned()));
    assert!(calls.contains(&"stop:hosting".to_owned()));
}

#[tokio::test]
async fn run_drives_the_full_cycle_until_shutdown() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    let report = session
        .run(ShutdownOptions::Future(Box::pin(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
        })))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(session.state(), SessionState::Stopped);

    let calls = calls_of(&calls);
    assert_eq!(calls.len(), 9, "three instances x three phases: {calls:?}");
    assert!(calls[..3].iter().all(|c| c.starts_with("start:")));
    assert!(calls[3..6].iter().all(|c| c.starts_with("connect:")));
    assert!(calls[6..].iter().all(|c| c.starts_with("stop:")));
}

#[tokio::test]
async fn run_with_pre_cancelled_token_tears_down_immediately() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        session.run(ShutdownOptions::Token(token)),
    )
    .await
    .expect("pre-cancelled token must not hang the run loop")
    .unwrap();

    assert!(report.is_clean());
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn directory_reflects_live_instances() {
    let calls: CallTracker = Arc::new(Mutex::new(Vec::new()));
    let session = Session::new(three_emulator_registry(&calls));

    session.start().await.unwrap();

    let directory = session.directory();
    for kind in [
        EmulatorKind::Database,
        EmulatorKind::Functions,
        EmulatorKind::Hosting,
    ] {
        let info = directory.get(kind).unwrap();
        assert!(info.ready, "{kind} should be ready after connect");
        assert_ne!(info.binding.port, 0);
    }

    session.stop().await;
    assert!(session.directory().all().is_empty());
}
