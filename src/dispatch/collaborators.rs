//! Interfaces to the collaborators the dispatcher relies on.
//!
//! The dispatcher never owns classroom data.  It reads the roster and
//! tracking flags through [`RosterProvider`] and [`TrackingState`], and
//! hands finished events to a [`ParticipationSink`].

use async_trait::async_trait;
use thiserror::Error;

use crate::interpret::{Candidate, QualityLevel};

// ---------------------------------------------------------------------------
// ParticipationEvent
// ---------------------------------------------------------------------------

/// One scored participation, produced from a single transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipationEvent {
    /// The roster entry the transcript named.
    pub student: Candidate,
    pub quality: QualityLevel,
    /// The transcript split on whitespace.
    pub matched_keywords: Vec<String>,
    /// Fixed heuristic certainty, not a probability.
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Failure reported by a [`ParticipationSink`].
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The sink refused the event (e.g. tracking stopped meanwhile).
    #[error("participation rejected: {0}")]
    Rejected(String),

    /// The event could not be stored.
    #[error("failed to store participation: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Current tracking flags and the mutators voice commands drive.
pub trait TrackingState: Send + Sync {
    fn is_tracking(&self) -> bool;

    /// Identifier of the selected class section, if any.
    fn current_section(&self) -> Option<String>;

    fn request_start(&self);

    fn request_stop(&self);
}

/// Supplies the roster the resolver matches against.
///
/// Called once per dispatch, so edits to the roster are picked up by the
/// next transcript without any change notification.
pub trait RosterProvider: Send + Sync {
    fn candidates(&self) -> Vec<Candidate>;
}

/// Receives scored participation events.
///
/// Called exactly once per qualifying transcript and never retried.
#[async_trait]
pub trait ParticipationSink: Send + Sync {
    async fn record(&self, event: &ParticipationEvent, duration_secs: u32)
        -> Result<(), SinkError>;
}
