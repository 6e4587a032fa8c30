//! Recognition session state machine.
//!
//! [`SessionMachine`] is a pure transition function: it consumes one
//! [`SessionEvent`] at a time and returns the [`SessionEffect`]s the caller
//! must carry out (create or tear down the engine, schedule timers, hand a
//! transcript to the dispatcher, notify the user).  It owns no engine, no
//! timers and no clock, so every transition is testable synchronously.
//!
//! The transitions are:
//!
//! ```text
//! Idle ──Begin──▶ Starting ──EngineStarted──▶ Listening
//! Listening ──final result──▶ Processing ──dispatch done──▶ Listening
//!                                        (restart scheduled after a short delay)
//! Starting|Listening|Processing ──error──▶ Error ──retry timer──▶ Starting
//!                               ──not-allowed──▶ PermissionDenied
//! any ──EngineEnded (tracking, not denied)──▶ Starting
//! PermissionDenied ──ResetPermission──▶ Idle (──▶ Starting if tracking)
//! any ──End──▶ Idle
//! ```

use std::time::Duration;

use crate::config::RecognitionConfig;
use crate::notify::Notice;

use super::engine::EngineErrorKind;
use super::retry::{Backoff, RetryConfig, RetryPolicy};
use super::timers::TimerKind;

// ---------------------------------------------------------------------------
// RecognitionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    /// No engine instance is running.
    Idle,
    /// An instance was created and asked to start; no confirmation yet.
    Starting,
    /// The instance confirmed it is listening.
    Listening,
    /// A finalized transcript is being dispatched.
    Processing,
    /// The last instance failed; a retry may be pending.
    Error,
    /// Microphone access was refused.  Nothing restarts until reset.
    PermissionDenied,
}

impl RecognitionState {
    /// Short label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            RecognitionState::Idle => "Voice recognition off",
            RecognitionState::Starting => "Starting",
            RecognitionState::Listening => "Listening",
            RecognitionState::Processing => "Processing",
            RecognitionState::Error => "Error",
            RecognitionState::PermissionDenied => "Microphone access denied",
        }
    }

    /// `true` when an instance is expected to be live.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RecognitionState::Starting | RecognitionState::Listening | RecognitionState::Processing
        )
    }
}

impl Default for RecognitionState {
    fn default() -> Self {
        RecognitionState::Idle
    }
}

// ---------------------------------------------------------------------------
// Events and effects
// ---------------------------------------------------------------------------

/// How a dispatched transcript affects the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Keep listening.
    Continue,
    /// A stop command was heard: end the session.
    StopRequested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Tracking was switched on.
    Begin,
    /// Tracking was switched off.
    End,
    EngineStarted,
    EngineResult { transcript: String, is_final: bool },
    EngineError(EngineErrorKind),
    EngineEnded,
    /// The backend could not create an instance at all.
    EngineUnavailable(String),
    DispatchFinished(DispatchOutcome),
    TimerFired(TimerKind),
    VisibilityChanged { visible: bool },
    /// The user granted microphone access again.
    ResetPermission,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Tear down any existing instance, then create and start a new one.
    CreateEngine,
    /// Stop and drop the current instance.
    TeardownEngine,
    Dispatch(String),
    Schedule(TimerKind, Duration),
    Cancel(TimerKind),
    CancelAll,
    Notify(Notice),
}

// ---------------------------------------------------------------------------
// SessionMachine
// ---------------------------------------------------------------------------

pub struct SessionMachine {
    state: RecognitionState,
    /// Tracking is on and the session should keep listening.
    desired: bool,
    permission_denied: bool,
    permission_notified: bool,
    unavailable_notified: bool,
    /// Failure notice already issued in this failure episode.
    failure_notified: bool,
    retry_pending: bool,
    retry: RetryPolicy,
    restart_delay: Duration,
    watchdog_interval: Duration,
    /// Instances created so far.
    starts: u64,
    /// `starts` seen by the last watchdog check while still `Starting`.
    watchdog_mark: Option<u64>,
}

impl SessionMachine {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self {
            state: RecognitionState::Idle,
            desired: false,
            permission_denied: false,
            permission_notified: false,
            unavailable_notified: false,
            failure_notified: false,
            retry_pending: false,
            retry: RetryPolicy::new(RetryConfig::from(config)),
            restart_delay: config.restart_delay(),
            watchdog_interval: config.watchdog_interval(),
            starts: 0,
            watchdog_mark: None,
        }
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn is_desired(&self) -> bool {
        self.desired
    }

    pub fn permission_denied(&self) -> bool {
        self.permission_denied
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// Apply one event and return the effects to execute, in order.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        let before = self.state;
        let effects = match event {
            SessionEvent::Begin => self.on_begin(),
            SessionEvent::End => self.on_end(),
            SessionEvent::EngineStarted => self.on_started(),
            SessionEvent::EngineResult {
                transcript,
                is_final,
            } => self.on_result(transcript, is_final),
            SessionEvent::EngineError(kind) => self.on_error(kind),
            SessionEvent::EngineEnded => self.on_ended(),
            SessionEvent::EngineUnavailable(reason) => self.on_unavailable(reason),
            SessionEvent::DispatchFinished(outcome) => self.on_dispatch_finished(outcome),
            SessionEvent::TimerFired(kind) => self.on_timer(kind),
            SessionEvent::VisibilityChanged { visible } => self.on_visibility(visible),
            SessionEvent::ResetPermission => self.on_reset_permission(),
        };
        if before != self.state {
            log::debug!("session: {:?} -> {:?}", before, self.state);
        }
        effects
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn on_begin(&mut self) -> Vec<SessionEffect> {
        self.desired = true;
        if self.permission_denied {
            log::info!("session: begin ignored, microphone access denied");
            self.state = RecognitionState::PermissionDenied;
            return Vec::new();
        }
        if self.state.is_active() {
            return Vec::new();
        }
        let mut effects = self.restart();
        effects.push(SessionEffect::Schedule(
            TimerKind::Watchdog,
            self.watchdog_interval,
        ));
        effects
    }

    fn on_end(&mut self) -> Vec<SessionEffect> {
        self.desired = false;
        self.retry_pending = false;
        self.failure_notified = false;
        self.watchdog_mark = None;
        self.retry.reset();
        if self.state != RecognitionState::PermissionDenied {
            self.state = RecognitionState::Idle;
        }
        vec![SessionEffect::CancelAll, SessionEffect::TeardownEngine]
    }

    fn on_started(&mut self) -> Vec<SessionEffect> {
        if !self.desired || self.permission_denied {
            return Vec::new();
        }
        self.state = RecognitionState::Listening;
        self.retry.reset();
        self.failure_notified = false;
        self.watchdog_mark = None;
        log::info!("session: listening");
        Vec::new()
    }

    fn on_result(&mut self, transcript: String, is_final: bool) -> Vec<SessionEffect> {
        if !is_final {
            log::trace!("session: interim result {transcript:?}");
            return Vec::new();
        }
        if self.state != RecognitionState::Listening {
            log::debug!(
                "session: dropping result while {:?}: {transcript:?}",
                self.state
            );
            return Vec::new();
        }
        self.state = RecognitionState::Processing;
        vec![SessionEffect::Dispatch(transcript)]
    }

    fn on_dispatch_finished(&mut self, outcome: DispatchOutcome) -> Vec<SessionEffect> {
        if outcome == DispatchOutcome::StopRequested {
            return self.on_end();
        }
        if self.state != RecognitionState::Processing {
            return Vec::new();
        }
        self.state = RecognitionState::Listening;
        vec![SessionEffect::Schedule(
            TimerKind::RestartAfterResult,
            self.restart_delay,
        )]
    }

    fn on_error(&mut self, kind: EngineErrorKind) -> Vec<SessionEffect> {
        if !self.desired || self.permission_denied {
            return Vec::new();
        }
        log::warn!("session: engine error {:?}", kind.code());

        if kind == EngineErrorKind::PermissionDenied {
            self.permission_denied = true;
            self.retry_pending = false;
            self.state = RecognitionState::PermissionDenied;
            let mut effects = vec![SessionEffect::CancelAll, SessionEffect::TeardownEngine];
            if !self.permission_notified {
                self.permission_notified = true;
                effects.push(SessionEffect::Notify(Notice::error(
                    "mic-permission",
                    "Microphone access denied. Please check your permissions.",
                )));
            }
            return effects;
        }

        self.state = RecognitionState::Error;

        if let Some(delay) = self.retry.transient_delay(&kind) {
            return self.schedule_retry(delay);
        }

        match self.retry.next_backoff() {
            Backoff::Retry { delay, attempt } => {
                log::info!(
                    "session: reconnect attempt {attempt}/{} in {delay:?}",
                    self.retry.config().max_attempts
                );
                self.schedule_retry(delay)
            }
            Backoff::Exhausted if !self.failure_notified => {
                self.failure_notified = true;
                let mut effects = vec![SessionEffect::Notify(Notice::error(
                    "recognition-error",
                    "Voice recognition failed to connect.",
                ))];
                effects.extend(self.schedule_retry(self.retry.final_delay()));
                effects
            }
            Backoff::Exhausted => {
                log::error!("session: giving up after repeated engine errors");
                self.retry_pending = false;
                vec![
                    SessionEffect::Cancel(TimerKind::Retry),
                    SessionEffect::TeardownEngine,
                ]
            }
        }
    }

    fn on_ended(&mut self) -> Vec<SessionEffect> {
        if !self.desired || self.permission_denied {
            if self.state.is_active() || self.state == RecognitionState::Error {
                self.state = RecognitionState::Idle;
            }
            return Vec::new();
        }
        if self.retry_pending {
            // The retry timer owns the next start.
            return Vec::new();
        }
        log::debug!("session: engine ended, restarting");
        self.restart()
    }

    fn on_unavailable(&mut self, reason: String) -> Vec<SessionEffect> {
        self.state = RecognitionState::Error;
        self.retry_pending = false;
        log::error!("session: engine unavailable: {reason}");
        let mut effects = vec![SessionEffect::Cancel(TimerKind::Retry)];
        if !self.unavailable_notified {
            self.unavailable_notified = true;
            effects.push(SessionEffect::Notify(Notice::error(
                "speech-unavailable",
                "Speech recognition is not available.",
            )));
        }
        effects
    }

    fn on_timer(&mut self, kind: TimerKind) -> Vec<SessionEffect> {
        if !self.desired || self.permission_denied {
            return Vec::new();
        }
        match kind {
            TimerKind::RestartAfterResult => {
                if self.state == RecognitionState::Listening {
                    self.restart()
                } else {
                    Vec::new()
                }
            }
            TimerKind::Retry => {
                self.retry_pending = false;
                self.restart()
            }
            TimerKind::Watchdog => {
                let mut effects = Vec::new();
                match self.state {
                    RecognitionState::Idle => {
                        log::info!("session: watchdog found session idle, restarting");
                        effects = self.restart();
                    }
                    RecognitionState::Starting if self.watchdog_mark == Some(self.starts) => {
                        log::info!("session: watchdog found start unconfirmed, restarting");
                        effects = self.restart();
                    }
                    RecognitionState::Starting => {
                        self.watchdog_mark = Some(self.starts);
                    }
                    _ => self.watchdog_mark = None,
                }
                effects.push(SessionEffect::Schedule(
                    TimerKind::Watchdog,
                    self.watchdog_interval,
                ));
                effects
            }
        }
    }

    fn on_visibility(&mut self, visible: bool) -> Vec<SessionEffect> {
        if !visible || !self.desired || self.permission_denied {
            return Vec::new();
        }
        if matches!(
            self.state,
            RecognitionState::Listening | RecognitionState::Processing
        ) {
            return Vec::new();
        }
        log::info!("session: visible again while {:?}, restarting", self.state);
        self.restart()
    }

    fn on_reset_permission(&mut self) -> Vec<SessionEffect> {
        self.permission_denied = false;
        self.permission_notified = false;
        if self.state == RecognitionState::PermissionDenied {
            self.state = RecognitionState::Idle;
        }
        if self.desired {
            self.on_begin()
        } else {
            Vec::new()
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn restart(&mut self) -> Vec<SessionEffect> {
        self.state = RecognitionState::Starting;
        self.retry_pending = false;
        self.starts += 1;
        self.watchdog_mark = None;
        vec![
            SessionEffect::Cancel(TimerKind::Retry),
            SessionEffect::Cancel(TimerKind::RestartAfterResult),
            SessionEffect::CreateEngine,
        ]
    }

    fn schedule_retry(&mut self, delay: Duration) -> Vec<SessionEffect> {
        self.retry_pending = true;
        vec![SessionEffect::Schedule(TimerKind::Retry, delay)]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
