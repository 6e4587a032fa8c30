//! Transcript dispatcher: turns one finalized transcript into one signal.
//!
//! # Flow
//!
//! ```text
//! transcript
//!   ├─ busy?                          → Ignored(Busy)
//!   ├─ start phrase?  ── no section   → Ignored(NoSection) + error notice
//!   │                 └─ section      → StartCommand
//!   ├─ stop phrase?                   → StopCommand
//!   ├─ not tracking / no section      → Ignored(NotTracking)
//!   ├─ no trigger word                → Ignored(NoTrigger)
//!   ├─ no roster name                 → Ignored(NoName)
//!   ├─ no quality in THIS transcript  → Ignored(NoQuality)
//!   └─ sink.record(..).await          → ParticipationRecorded(event)
//! ```
//!
//! Only one dispatch runs at a time.  A transcript that arrives while
//! another is still being recorded is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::interpret::{command, NameDetectionMode, NameResolver, QualityCatalog};
use crate::notify::{Notice, Notifier};

use super::collaborators::{ParticipationEvent, ParticipationSink, RosterProvider, TrackingState};

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Why a transcript produced no command and no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Another transcript was still being processed.
    Busy,
    /// A start command was heard but no section is selected.
    NoSection,
    /// Tracking is off or no section is selected.
    NotTracking,
    NoTrigger,
    NoName,
    /// A student was named but no quality keyword was said.
    NoQuality,
    /// The participation sink refused or failed to store the event.
    RecordFailed,
}

/// Outcome of dispatching one transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    StartCommand,
    StopCommand,
    ParticipationRecorded(ParticipationEvent),
    Ignored(IgnoreReason),
}

// ---------------------------------------------------------------------------
// DispatchSettings
// ---------------------------------------------------------------------------

/// Phrase sets and constants used by the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub start_phrases: Vec<String>,
    pub stop_phrases: Vec<String>,
    pub triggers: Vec<String>,
    pub name_mode: NameDetectionMode,
    pub confidence: f32,
    pub duration_secs: u32,
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            start_phrases: config.vocabulary.start_phrases.clone(),
            stop_phrases: config.vocabulary.stop_phrases.clone(),
            triggers: config.vocabulary.triggers.clone(),
            name_mode: config.matching.name_mode,
            confidence: config.matching.confidence,
            duration_secs: config.matching.duration_secs,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// InFlight guard
// ---------------------------------------------------------------------------

/// Holds the single-flight flag; clears it when dropped, including on early
/// return, panic or cancellation of the dispatch future.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// TranscriptDispatcher
// ---------------------------------------------------------------------------

/// Interprets finalized transcripts against the live roster.
pub struct TranscriptDispatcher {
    settings: DispatchSettings,
    name_mode: Mutex<NameDetectionMode>,
    catalog: QualityCatalog,
    resolver: NameResolver,
    tracking: Arc<dyn TrackingState>,
    roster: Arc<dyn RosterProvider>,
    sink: Arc<dyn ParticipationSink>,
    notifier: Arc<dyn Notifier>,
    in_flight: AtomicBool,
}

impl TranscriptDispatcher {
    pub fn new(
        settings: DispatchSettings,
        catalog: QualityCatalog,
        resolver: NameResolver,
        tracking: Arc<dyn TrackingState>,
        roster: Arc<dyn RosterProvider>,
        sink: Arc<dyn ParticipationSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let name_mode = Mutex::new(settings.name_mode);
        Self {
            settings,
            name_mode,
            catalog,
            resolver,
            tracking,
            roster,
            sink,
            notifier,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Build a dispatcher with catalog, resolver and phrase sets taken from
    /// `config`.
    pub fn from_config(
        config: &AppConfig,
        tracking: Arc<dyn TrackingState>,
        roster: Arc<dyn RosterProvider>,
        sink: Arc<dyn ParticipationSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(
            DispatchSettings::from_config(config),
            QualityCatalog::with_synonyms(&config.vocabulary.quality_synonyms),
            NameResolver::new(config.matching.weights.clone()),
            tracking,
            roster,
            sink,
            notifier,
        )
    }

    pub fn name_mode(&self) -> NameDetectionMode {
        match self.name_mode.lock() {
            Ok(mode) => *mode,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_name_mode(&self, mode: NameDetectionMode) {
        match self.name_mode.lock() {
            Ok(mut current) => *current = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
        log::info!("dispatch: name detection mode set to {mode:?}");
    }

    /// `true` while a dispatch is in progress.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Interpret one finalized transcript.
    pub async fn dispatch(&self, transcript: &str) -> Signal {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            log::debug!("dispatch: busy, dropping {transcript:?}");
            return Signal::Ignored(IgnoreReason::Busy);
        };

        let text = transcript.trim().to_lowercase();
        log::debug!("dispatch: processing {text:?}");

        if command::matches(&text, &self.settings.start_phrases) {
            if self.tracking.current_section().is_none() {
                self.notifier
                    .notify(Notice::error("no-section", "Please select a section first"));
                return Signal::Ignored(IgnoreReason::NoSection);
            }
            log::info!("dispatch: start command");
            self.tracking.request_start();
            self.notifier.notify(Notice::success(
                "tracking-started",
                "Started tracking participation",
            ));
            return Signal::StartCommand;
        }

        if command::matches(&text, &self.settings.stop_phrases) {
            log::info!("dispatch: stop command");
            self.tracking.request_stop();
            self.notifier.notify(Notice::success(
                "tracking-stopped",
                "Stopped tracking participation",
            ));
            return Signal::StopCommand;
        }

        if !self.tracking.is_tracking() || self.tracking.current_section().is_none() {
            log::debug!("dispatch: tracking is off or no section selected");
            return Signal::Ignored(IgnoreReason::NotTracking);
        }

        let Some(trigger) = command::find_trigger(&text, &self.settings.triggers) else {
            log::debug!("dispatch: no participation trigger");
            return Signal::Ignored(IgnoreReason::NoTrigger);
        };
        log::debug!("dispatch: trigger {trigger:?}");

        let roster = self.roster.candidates();
        let Some(hit) = self.resolver.resolve(&text, &roster, self.name_mode()) else {
            return Signal::Ignored(IgnoreReason::NoName);
        };
        let student = hit.candidate.clone();

        let Some(quality) = self.catalog.extract(&text).cloned() else {
            log::debug!("dispatch: {} named without a quality", student.display_name());
            self.notifier.notify(Notice::info(
                "no-quality",
                format!(
                    "Student {} detected but no quality specified",
                    student.display_name()
                ),
            ));
            return Signal::Ignored(IgnoreReason::NoQuality);
        };

        let event = ParticipationEvent {
            student,
            quality,
            matched_keywords: text.split_whitespace().map(str::to_string).collect(),
            confidence: self.settings.confidence,
        };

        match self.sink.record(&event, self.settings.duration_secs).await {
            Ok(()) => {
                log::info!(
                    "dispatch: recorded {} ({}) for {}",
                    event.quality.keyword,
                    event.quality.score,
                    event.student.display_name()
                );
                self.notifier.notify(Notice::success(
                    "participation-recorded",
                    format!(
                        "Recorded {} (Score: {}) participation for {}",
                        event.quality.keyword,
                        event.quality.score,
                        event.student.display_name()
                    ),
                ));
                Signal::ParticipationRecorded(event)
            }
            Err(e) => {
                log::warn!("dispatch: sink failed: {e}");
                self.notifier.notify(Notice::error(
                    "participation-failed",
                    "Failed to record participation",
                ));
                Signal::Ignored(IgnoreReason::RecordFailed)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::collaborators::SinkError;
    use crate::interpret::Candidate;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::{mpsc, Notify};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    struct FakeTracking {
        tracking: AtomicBool,
        section: Mutex<Option<String>>,
    }

    impl FakeTracking {
        fn new(tracking: bool, section: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                tracking: AtomicBool::new(tracking),
                section: Mutex::new(section.map(str::to_string)),
            })
        }
    }

    impl TrackingState for FakeTracking {
        fn is_tracking(&self) -> bool {
            self.tracking.load(Ordering::SeqCst)
        }
        fn current_section(&self) -> Option<String> {
            self.section.lock().unwrap().clone()
        }
        fn request_start(&self) {
            self.tracking.store(true, Ordering::SeqCst);
        }
        fn request_stop(&self) {
            self.tracking.store(false, Ordering::SeqCst);
        }
    }

    struct FixedRoster(Vec<Candidate>);

    impl RosterProvider for FixedRoster {
        fn candidates(&self) -> Vec<Candidate> {
            self.0.clone()
        }
    }

    /// Records every event; optionally fails.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ParticipationEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl ParticipationSink for RecordingSink {
        async fn record(&self, event: &ParticipationEvent, _secs: u32) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Storage("disk full".into()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Blocks inside `record` until released.
    struct GatedSink {
        entered: mpsc::UnboundedSender<()>,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ParticipationSink for GatedSink {
        async fn record(&self, _event: &ParticipationEvent, _secs: u32) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.entered.send(());
            self.release.notified().await;
            Ok(())
        }
    }

    struct CollectNotifier(Mutex<Vec<Notice>>);

    impl Notifier for CollectNotifier {
        fn notify(&self, notice: Notice) {
            self.0.lock().unwrap().push(notice);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn roster() -> Arc<FixedRoster> {
        Arc::new(FixedRoster(vec![
            Candidate::new("s1", "John", "Smith"),
            Candidate::new("s2", "Maria", "Garcia"),
        ]))
    }

    fn dispatcher_with(
        tracking: Arc<FakeTracking>,
        sink: Arc<dyn ParticipationSink>,
    ) -> (TranscriptDispatcher, Arc<CollectNotifier>) {
        let notifier = Arc::new(CollectNotifier(Mutex::new(Vec::new())));
        let d = TranscriptDispatcher::from_config(
            &AppConfig::default(),
            tracking,
            roster(),
            sink,
            notifier.clone(),
        );
        (d, notifier)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn records_name_and_quality_in_same_transcript() {
        let sink = Arc::new(RecordingSink::default());
        let (d, notes) = dispatcher_with(FakeTracking::new(true, Some("p1")), sink.clone());

        let event = match d.dispatch("Smith answers very good").await {
            Signal::ParticipationRecorded(event) => event,
            other => panic!("expected a recorded participation, got {other:?}"),
        };
        assert_eq!(event.student.id, "s1");
        assert_eq!(event.quality.score, 4);
        assert_eq!(event.matched_keywords, vec!["smith", "answers", "very", "good"]);
        assert!((event.confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
        assert!(notes
            .0
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.message.contains("Very Good (Score: 4)")));
    }

    #[tokio::test]
    async fn quality_is_never_carried_across_transcripts() {
        let sink = Arc::new(RecordingSink::default());
        let (d, _) = dispatcher_with(FakeTracking::new(true, Some("p1")), sink.clone());

        assert_eq!(
            d.dispatch("smith participates").await,
            Signal::Ignored(IgnoreReason::NoQuality)
        );
        assert_eq!(d.dispatch("good").await, Signal::Ignored(IgnoreReason::NoTrigger));
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_command_requires_section() {
        let tracking = FakeTracking::new(false, None);
        let (d, notes) = dispatcher_with(tracking.clone(), Arc::new(RecordingSink::default()));

        assert_eq!(
            d.dispatch("start tracking").await,
            Signal::Ignored(IgnoreReason::NoSection)
        );
        assert!(!tracking.is_tracking());
        assert_eq!(notes.0.lock().unwrap()[0].key, "no-section");
    }

    #[tokio::test]
    async fn start_and_stop_commands_drive_tracking_state() {
        let tracking = FakeTracking::new(false, Some("p1"));
        let (d, _) = dispatcher_with(tracking.clone(), Arc::new(RecordingSink::default()));

        assert_eq!(d.dispatch("lets start").await, Signal::StartCommand);
        assert!(tracking.is_tracking());
        assert_eq!(d.dispatch("okay that's all").await, Signal::StopCommand);
        assert!(!tracking.is_tracking());
    }

    #[tokio::test]
    async fn participation_ignored_when_not_tracking() {
        let sink = Arc::new(RecordingSink::default());
        let (d, _) = dispatcher_with(FakeTracking::new(false, Some("p1")), sink.clone());
        assert_eq!(
            d.dispatch("smith answers good").await,
            Signal::Ignored(IgnoreReason::NotTracking)
        );

        let (d, _) = dispatcher_with(FakeTracking::new(true, None), sink.clone());
        assert_eq!(
            d.dispatch("smith answers good").await,
            Signal::Ignored(IgnoreReason::NotTracking)
        );
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_trigger_or_name_is_ignored() {
        let (d, _) = dispatcher_with(
            FakeTracking::new(true, Some("p1")),
            Arc::new(RecordingSink::default()),
        );
        assert_eq!(
            d.dispatch("smith very good").await,
            Signal::Ignored(IgnoreReason::NoTrigger)
        );
        assert_eq!(
            d.dispatch("nobody answers good").await,
            Signal::Ignored(IgnoreReason::NoName)
        );
    }

    #[tokio::test]
    async fn sink_failure_is_reported_not_retried() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let (d, notes) = dispatcher_with(FakeTracking::new(true, Some("p1")), sink);

        assert_eq!(
            d.dispatch("garcia answers excellent").await,
            Signal::Ignored(IgnoreReason::RecordFailed)
        );
        assert!(!d.is_busy());
        assert!(notes
            .0
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.key == "participation-failed"));
    }

    #[tokio::test]
    async fn name_mode_can_be_switched() {
        let sink = Arc::new(RecordingSink::default());
        let (d, _) = dispatcher_with(FakeTracking::new(true, Some("p1")), sink);

        d.set_name_mode(NameDetectionMode::LastNameOnly);
        assert_eq!(d.name_mode(), NameDetectionMode::LastNameOnly);
        assert_eq!(
            d.dispatch("maria answers good").await,
            Signal::Ignored(IgnoreReason::NoName)
        );

        d.set_name_mode(NameDetectionMode::FirstNameOnly);
        assert!(matches!(
            d.dispatch("maria answers good").await,
            Signal::ParticipationRecorded(_)
        ));
    }

    #[tokio::test]
    async fn overlapping_dispatch_is_dropped() {
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(GatedSink {
            entered: entered_tx,
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let (d, _) = dispatcher_with(FakeTracking::new(true, Some("p1")), sink.clone());
        let d = Arc::new(d);

        let first = {
            let d = Arc::clone(&d);
            tokio::spawn(async move { d.dispatch("smith answers good").await })
        };
        entered_rx.recv().await.unwrap();
        assert!(d.is_busy());

        assert_eq!(
            d.dispatch("garcia answers excellent").await,
            Signal::Ignored(IgnoreReason::Busy)
        );

        sink.release.notify_one();
        let signal = first.await.unwrap();
        assert!(matches!(signal, Signal::ParticipationRecorded(_)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(!d.is_busy());
    }

    #[tokio::test]
    async fn cancelled_dispatch_releases_in_flight_flag() {
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(GatedSink {
            entered: entered_tx,
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let (d, _) = dispatcher_with(FakeTracking::new(true, Some("p1")), sink.clone());
        let d = Arc::new(d);

        let stuck = {
            let d = Arc::clone(&d);
            tokio::spawn(async move { d.dispatch("smith answers good").await })
        };
        entered_rx.recv().await.unwrap();
        assert!(d.is_busy());

        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());
        assert!(!d.is_busy());

        // Stored permit lets the next `record` complete immediately.
        sink.release.notify_one();
        assert!(matches!(
            d.dispatch("garcia answers excellent").await,
            Signal::ParticipationRecorded(_)
        ));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }
}
