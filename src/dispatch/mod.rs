//! Transcript dispatch: from a finalized transcript to a command or a scored
//! participation event.
//!
//! This module provides:
//! * [`TranscriptDispatcher`]: single-flight interpreter of transcripts.
//! * [`Signal`] / [`IgnoreReason`]: the dispatch outcome.
//! * [`TrackingState`], [`RosterProvider`], [`ParticipationSink`]: the
//!   collaborator seams implemented by the classroom store (or test fakes).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use participation_tracker::config::AppConfig;
//! use participation_tracker::dispatch::TranscriptDispatcher;
//! use participation_tracker::notify::LogNotifier;
//! use participation_tracker::store::{ClassroomStore, SharedClassroom};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let classroom = SharedClassroom::new(ClassroomStore::default());
//!     let store = Arc::new(classroom);
//!
//!     let dispatcher = TranscriptDispatcher::from_config(
//!         &config,
//!         store.clone(),
//!         store.clone(),
//!         store,
//!         Arc::new(LogNotifier),
//!     );
//!     let signal = dispatcher.dispatch("smith answers very good").await;
//!     println!("{signal:?}");
//! }
//! ```

pub mod collaborators;
pub mod dispatcher;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use collaborators::{
    ParticipationEvent, ParticipationSink, RosterProvider, SinkError, TrackingState,
};
pub use dispatcher::{DispatchSettings, IgnoreReason, Signal, TranscriptDispatcher};
