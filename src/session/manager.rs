//! Session manager: runs the [`SessionMachine`] against a real engine,
//! real timers and the transcript dispatcher.
//!
//! [`SessionManager::run`] is a single async loop, so engine callbacks,
//! timer fires, dispatch completions and control commands are handled one
//! at a time in arrival order.
//!
//! # Flow
//!
//! ```text
//! SessionCommand ─┐
//! StampedEvent   ─┤  (stale generations dropped)
//! TimerFired     ─┤  (stale tickets dropped)
//! dispatch done  ─┘
//!        │
//!        ▼
//! SessionMachine::handle ─▶ [SessionEffect]
//!        │
//!        ├─ CreateEngine / TeardownEngine ─▶ EngineBackend
//!        ├─ Dispatch(transcript)          ─▶ spawn(TranscriptDispatcher::dispatch)
//!        ├─ Schedule / Cancel             ─▶ Timers
//!        └─ Notify                        ─▶ Notifier
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::RecognitionConfig;
use crate::dispatch::{Signal, TranscriptDispatcher};
use crate::notify::Notifier;

use super::engine::{
    EngineBackend, EngineError, EngineErrorKind, EngineEvent, EngineEvents, Generation,
    RecognitionEngine, StampedEvent,
};
use super::state::{DispatchOutcome, RecognitionState, SessionEffect, SessionEvent, SessionMachine};
use super::timers::{TimerFired, Timers};

// ---------------------------------------------------------------------------
// Commands and status
// ---------------------------------------------------------------------------

/// Control requests from the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Begin,
    End,
    Visibility(bool),
    ResetPermission,
}

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    pub state: RecognitionState,
    /// Generation of the current (or last) engine instance.
    pub generation: Generation,
    pub last_transcript: Option<String>,
}

/// Thread-safe handle to [`SessionStatus`].
///
/// Do **not** hold the lock across `.await` points.
pub type SharedStatus = Arc<Mutex<SessionStatus>>;

/// Cloneable control handle.  The manager stops once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    status: SharedStatus,
}

impl SessionHandle {
    fn send(&self, cmd: SessionCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    pub fn begin(&self) -> bool {
        self.send(SessionCommand::Begin)
    }

    pub fn end(&self) -> bool {
        self.send(SessionCommand::End)
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.send(SessionCommand::Visibility(visible))
    }

    pub fn reset_permission(&self) -> bool {
        self.send(SessionCommand::ResetPermission)
    }

    pub fn status(&self) -> SessionStatus {
        match self.status.lock() {
            Ok(st) => st.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn state(&self) -> RecognitionState {
        self.status().state
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

pub struct SessionManager {
    machine: SessionMachine,
    language: String,
    backend: Arc<dyn EngineBackend>,
    dispatcher: Arc<TranscriptDispatcher>,
    notifier: Arc<dyn Notifier>,
    status: SharedStatus,

    engine: Option<Box<dyn RecognitionEngine>>,
    generation: Generation,

    commands: mpsc::UnboundedReceiver<SessionCommand>,
    engine_tx: mpsc::UnboundedSender<StampedEvent>,
    engine_rx: mpsc::UnboundedReceiver<StampedEvent>,
    timers: Timers,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    dispatch_tx: mpsc::UnboundedSender<Signal>,
    dispatch_rx: mpsc::UnboundedReceiver<Signal>,
}

impl SessionManager {
    /// Create a manager and its control handle.  Call [`run`](Self::run)
    /// inside a tokio task.
    pub fn new(
        config: &RecognitionConfig,
        backend: Arc<dyn EngineBackend>,
        dispatcher: Arc<TranscriptDispatcher>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, SessionHandle) {
        let (cmd_tx, commands) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let status: SharedStatus = Arc::new(Mutex::new(SessionStatus::default()));

        let manager = Self {
            machine: SessionMachine::new(config),
            language: config.language.clone(),
            backend,
            dispatcher,
            notifier,
            status: Arc::clone(&status),
            engine: None,
            generation: 0,
            commands,
            engine_tx,
            engine_rx,
            timers: Timers::new(timer_tx),
            timer_rx,
            dispatch_tx,
            dispatch_rx,
        };
        let handle = SessionHandle { tx: cmd_tx, status };
        (manager, handle)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until every [`SessionHandle`] is dropped, then tear down.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.apply(Self::command_event(cmd)),
                    None => break,
                },
                Some(stamped) = self.engine_rx.recv() => {
                    if let Some(event) = self.engine_event(stamped) {
                        self.apply(event);
                    }
                }
                Some(fired) = self.timer_rx.recv() => {
                    if self.timers.accept(fired) {
                        self.apply(SessionEvent::TimerFired(fired.kind));
                    } else {
                        log::trace!("session: stale timer {:?} #{}", fired.kind, fired.ticket);
                    }
                }
                Some(signal) = self.dispatch_rx.recv() => {
                    let outcome = match signal {
                        Signal::StopCommand => DispatchOutcome::StopRequested,
                        _ => DispatchOutcome::Continue,
                    };
                    self.apply(SessionEvent::DispatchFinished(outcome));
                }
            }
        }

        log::info!("session: control channel closed, shutting down");
        self.timers.cancel_all();
        self.teardown();
        self.set_state(RecognitionState::Idle);
    }

    fn command_event(cmd: SessionCommand) -> SessionEvent {
        match cmd {
            SessionCommand::Begin => SessionEvent::Begin,
            SessionCommand::End => SessionEvent::End,
            SessionCommand::Visibility(visible) => SessionEvent::VisibilityChanged { visible },
            SessionCommand::ResetPermission => SessionEvent::ResetPermission,
        }
    }

    /// Map an engine callback, dropping events from torn-down instances.
    fn engine_event(&self, stamped: StampedEvent) -> Option<SessionEvent> {
        if stamped.generation != self.generation || self.engine.is_none() {
            log::trace!(
                "session: dropping {:?} from instance #{} (current #{})",
                stamped.event,
                stamped.generation,
                self.generation
            );
            return None;
        }
        Some(match stamped.event {
            EngineEvent::Started => SessionEvent::EngineStarted,
            EngineEvent::Result {
                transcript,
                is_final,
            } => SessionEvent::EngineResult {
                transcript,
                is_final,
            },
            EngineEvent::Error(kind) => SessionEvent::EngineError(kind),
            EngineEvent::Ended => SessionEvent::EngineEnded,
        })
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    fn apply(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
        self.set_state(self.machine.state());
    }

    /// Carry out one effect.  Engine creation can fail synchronously; the
    /// failure comes back as an event for the machine.
    fn execute(&mut self, effect: SessionEffect) -> Option<SessionEvent> {
        match effect {
            SessionEffect::CreateEngine => return self.create_engine(),
            SessionEffect::TeardownEngine => self.teardown(),
            SessionEffect::Dispatch(transcript) => self.spawn_dispatch(transcript),
            SessionEffect::Schedule(kind, delay) => self.timers.schedule(kind, delay),
            SessionEffect::Cancel(kind) => self.timers.cancel(kind),
            SessionEffect::CancelAll => self.timers.cancel_all(),
            SessionEffect::Notify(notice) => self.notifier.notify(notice),
        }
        None
    }

    fn create_engine(&mut self) -> Option<SessionEvent> {
        self.teardown();
        self.generation += 1;
        let events = EngineEvents::new(self.generation, self.engine_tx.clone());
        log::debug!("session: creating engine instance #{}", self.generation);

        let mut engine = match self.backend.create(&self.language, events) {
            Ok(engine) => engine,
            Err(EngineError::Unavailable(reason)) => {
                return Some(SessionEvent::EngineUnavailable(reason));
            }
            Err(e) => {
                return Some(SessionEvent::EngineError(EngineErrorKind::Other(e.to_string())));
            }
        };

        match engine.start() {
            Ok(()) => {
                self.engine = Some(engine);
                None
            }
            Err(e) => {
                log::warn!("session: instance #{} failed to start: {e}", self.generation);
                engine.stop();
                Some(SessionEvent::EngineError(EngineErrorKind::Other(e.to_string())))
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            log::debug!("session: tearing down instance #{}", self.generation);
            engine.stop();
        }
    }

    fn spawn_dispatch(&mut self, transcript: String) {
        log::debug!("session: dispatching {transcript:?}");
        if let Ok(mut st) = self.status.lock() {
            st.last_transcript = Some(transcript.clone());
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let done = self.dispatch_tx.clone();
        tokio::spawn(async move {
            let signal = dispatcher.dispatch(&transcript).await;
            let _ = done.send(signal);
        });
    }

    fn set_state(&self, state: RecognitionState) {
        if let Ok(mut st) = self.status.lock() {
            st.state = state;
            st.generation = self.generation;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::AppConfig;
    use crate::dispatch::{RosterProvider, TrackingState};
    use crate::notify::Notice;
    use crate::session::engine::FakeBackend;
    use crate::store::{ClassroomStore, SharedClassroom};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct CollectNotifier {
        keys: Mutex<Vec<&'static str>>,
    }

    impl CollectNotifier {
        fn keys(&self) -> Vec<&'static str> {
            self.keys.lock().unwrap().clone()
        }
    }

    impl Notifier for CollectNotifier {
        fn notify(&self, notice: Notice) {
            self.keys.lock().unwrap().push(notice.key);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    struct Harness {
        handle: SessionHandle,
        backend: FakeBackend,
        classroom: Arc<SharedClassroom>,
        notices: Arc<CollectNotifier>,
        task: tokio::task::JoinHandle<()>,
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        let rec = &mut config.recognition;
        rec.restart_delay_ms = 5;
        rec.network_retry_ms = 30;
        rec.no_speech_retry_ms = 5;
        rec.backoff_initial_ms = 5;
        rec.backoff_max_ms = 10;
        rec.final_retry_ms = 20;
        rec.watchdog_interval_ms = 60_000;
        config
    }

    fn classroom() -> Arc<SharedClassroom> {
        let mut store = ClassroomStore::default();
        let section = store.add_section("Period 1", None);
        store.add_student("John", "Smith", Some(section)).unwrap();
        store.add_student("Maria", "Garcia", Some(section)).unwrap();
        store.select_section(Some(section)).unwrap();
        store.start_tracking().unwrap();
        Arc::new(SharedClassroom::new(store))
    }

    fn start(config: AppConfig, backend: FakeBackend) -> Harness {
        let classroom = classroom();
        let notices = Arc::new(CollectNotifier::default());
        let dispatcher = Arc::new(TranscriptDispatcher::from_config(
            &config,
            classroom.clone(),
            classroom.clone(),
            classroom.clone(),
            notices.clone(),
        ));
        let (manager, handle) = SessionManager::new(
            &config.recognition,
            Arc::new(backend.clone()),
            dispatcher,
            notices.clone(),
        );
        let task = tokio::spawn(manager.run());
        Harness {
            handle,
            backend,
            classroom,
            notices,
            task,
        }
    }

    async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    async fn listening(h: &Harness) {
        let handle = h.handle.clone();
        wait_until("listening", || handle.state() == RecognitionState::Listening).await;
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn begin_reaches_listening() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;
        assert_eq!(h.backend.created(), 1);
        assert_eq!(h.handle.status().generation, 1);
    }

    #[tokio::test]
    async fn result_is_recorded_and_engine_restarted() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        h.backend
            .latest()
            .unwrap()
            .result("smith answers excellent", true);

        let classroom = h.classroom.clone();
        wait_until("record", || classroom.lock().records.len() == 1).await;
        let backend = h.backend.clone();
        wait_until("restart", || backend.created() == 2).await;
        listening(&h).await;

        assert_eq!(h.backend.stopped(), vec![1]);
        assert!(h.notices.keys().contains(&"participation-recorded"));
        assert_eq!(
            h.handle.status().last_transcript.as_deref(),
            Some("smith answers excellent")
        );
    }

    #[tokio::test]
    async fn events_from_torn_down_instance_are_dropped() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        // Unsolicited end: the manager replaces the instance.
        h.backend.latest().unwrap().ended();
        let backend = h.backend.clone();
        wait_until("replacement", || backend.created() == 2).await;
        listening(&h).await;

        let stale = h.backend.instance(0).unwrap();
        stale.result("smith answers excellent", true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.classroom.lock().records.is_empty());
        assert_eq!(h.backend.created(), 2);
    }

    #[tokio::test]
    async fn permission_denied_blocks_restart_until_reset() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        let first = h.backend.latest().unwrap();
        first.error("not-allowed");
        let handle = h.handle.clone();
        wait_until("denied", || {
            handle.state() == RecognitionState::PermissionDenied
        })
        .await;

        h.handle.set_visible(true);
        h.handle.begin();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.backend.created(), 1);
        assert_eq!(
            h.notices.keys().iter().filter(|k| **k == "mic-permission").count(),
            1
        );

        h.handle.reset_permission();
        let backend = h.backend.clone();
        wait_until("restart after grant", || backend.created() == 2).await;
        listening(&h).await;
    }

    #[tokio::test]
    async fn stopping_cancels_pending_retry() {
        let mut config = fast_config();
        config.recognition.network_retry_ms = 80;
        let h = start(config, FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        h.backend.latest().unwrap().error("network");
        let handle = h.handle.clone();
        wait_until("error", || handle.state() == RecognitionState::Error).await;
        h.handle.end();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.backend.created(), 1);
        assert_eq!(h.handle.state(), RecognitionState::Idle);
    }

    #[tokio::test]
    async fn transient_error_recovers() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        h.backend.latest().unwrap().error("no-speech");
        let backend = h.backend.clone();
        wait_until("retry", || backend.created() == 2).await;
        listening(&h).await;
        assert!(h.notices.keys().is_empty());
    }

    #[tokio::test]
    async fn stop_command_ends_session() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        h.backend.latest().unwrap().result("stop tracking", true);
        let handle = h.handle.clone();
        wait_until("idle", || handle.state() == RecognitionState::Idle).await;

        assert!(!h.classroom.is_tracking());
        assert_eq!(h.backend.stopped(), vec![1]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.backend.created(), 1);
    }

    #[tokio::test]
    async fn unavailable_backend_reports_once() {
        let h = start(fast_config(), FakeBackend::unavailable());
        h.handle.begin();
        let handle = h.handle.clone();
        wait_until("error", || handle.state() == RecognitionState::Error).await;
        assert_eq!(h.notices.keys(), vec!["speech-unavailable"]);
    }

    #[tokio::test]
    async fn watchdog_restarts_unconfirmed_start() {
        let mut config = fast_config();
        config.recognition.watchdog_interval_ms = 20;
        let h = start(config, FakeBackend::silent());
        h.handle.begin();

        let backend = h.backend.clone();
        wait_until("watchdog restart", || backend.created() >= 2).await;
        assert_eq!(h.handle.state(), RecognitionState::Starting);

        h.backend.set_silent(false);
        listening(&h).await;
    }

    #[tokio::test]
    async fn roster_edits_apply_to_next_transcript() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        let section = h.classroom.lock().current_section;
        h.classroom
            .update(|s| s.add_student("Ann", "Lee", section))
            .unwrap();
        assert_eq!(h.classroom.candidates().len(), 3);

        h.backend.latest().unwrap().result("lee answers good", true);
        let classroom = h.classroom.clone();
        wait_until("record", || classroom.lock().records.len() == 1).await;
    }

    #[tokio::test]
    async fn run_returns_when_handles_dropped() {
        let h = start(fast_config(), FakeBackend::new());
        h.handle.begin();
        listening(&h).await;

        let Harness {
            handle,
            backend,
            task,
            ..
        } = h;
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("manager stops")
            .expect("no panic");
        assert_eq!(backend.stopped(), vec![1]);
    }
}
