//! Continuous recognition session.
//!
//! This module keeps one speech engine instance alive for as long as
//! tracking is on: it restarts the engine after every result, retries on
//! errors, stops for good on a permission denial and recovers on
//! visibility changes.
//!
//! # Architecture
//!
//! ```text
//! SessionHandle ──SessionCommand──▶ SessionManager::run()  ← async tokio task
//!                                        │
//!                                        ├─ SessionMachine   (pure transitions)
//!                                        ├─ EngineBackend    (one instance at a time)
//!                                        ├─ Timers           (retry / restart / watchdog)
//!                                        └─ TranscriptDispatcher
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use participation_tracker::config::AppConfig;
//! use participation_tracker::dispatch::TranscriptDispatcher;
//! use participation_tracker::notify::LogNotifier;
//! use participation_tracker::session::{LineFeedBackend, SessionManager};
//! use participation_tracker::store::{ClassroomStore, SharedClassroom};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let store = Arc::new(SharedClassroom::new(ClassroomStore::default()));
//!     let dispatcher = Arc::new(TranscriptDispatcher::from_config(
//!         &config,
//!         store.clone(),
//!         store.clone(),
//!         store,
//!         Arc::new(LogNotifier),
//!     ));
//!
//!     let (lines, backend) = LineFeedBackend::channel();
//!     let (manager, session) = SessionManager::new(
//!         &config.recognition,
//!         Arc::new(backend),
//!         dispatcher,
//!         Arc::new(LogNotifier),
//!     );
//!     tokio::spawn(manager.run());
//!
//!     session.begin();
//!     lines.send("smith answers very good".into()).unwrap();
//! }
//! ```

pub mod engine;
pub mod feed;
pub mod manager;
pub mod retry;
pub mod state;
pub mod timers;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use engine::{
    EngineBackend, EngineError, EngineErrorKind, EngineEvent, EngineEvents, Generation,
    RecognitionEngine, StampedEvent,
};
pub use feed::LineFeedBackend;
pub use manager::{SessionCommand, SessionHandle, SessionManager, SessionStatus, SharedStatus};
pub use retry::{Backoff, RetryConfig, RetryPolicy};
pub use state::{DispatchOutcome, RecognitionState, SessionEffect, SessionEvent, SessionMachine};
pub use timers::{TimerFired, TimerKind, Timers};
