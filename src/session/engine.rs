//! Speech engine seam.
//!
//! # Overview
//!
//! A [`RecognitionEngine`] is one running recognition instance.  It is
//! created by an [`EngineBackend`] together with an [`EngineEvents`] handle
//! through which it reports `started`, `result`, `error` and `ended`
//! callbacks.  Every event is stamped with the generation of the instance
//! that produced it, so the session manager can drop events from an
//! instance it already tore down.
//!
//! [`FakeBackend`] (available under `#[cfg(test)]`) creates scripted engines
//! for driving the session manager without a microphone.

use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Monotonic id of an engine instance.
pub type Generation = u64;

/// Classified engine error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Microphone or service access was refused.  Terminal for the session.
    PermissionDenied,
    Network,
    NoSpeech,
    Other(String),
}

impl EngineErrorKind {
    /// Classify an engine error code (`"not-allowed"`, `"network"`, …).
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "not-allowed" | "permission-denied" | "service-not-allowed" => Self::PermissionDenied,
            "network" => Self::Network,
            "no-speech" => Self::NoSpeech,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::PermissionDenied => "not-allowed",
            Self::Network => "network",
            Self::NoSpeech => "no-speech",
            Self::Other(code) => code,
        }
    }
}

/// Callback from a recognition instance.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started,
    Result { transcript: String, is_final: bool },
    Error(EngineErrorKind),
    Ended,
}

/// An [`EngineEvent`] tagged with the instance that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedEvent {
    pub generation: Generation,
    pub event: EngineEvent,
}

/// Sender half handed to one engine instance.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    generation: Generation,
    tx: mpsc::UnboundedSender<StampedEvent>,
}

impl EngineEvents {
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<StampedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Send an event; returns `false` once the session manager is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(StampedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn started(&self) -> bool {
        self.emit(EngineEvent::Started)
    }

    pub fn result(&self, transcript: impl Into<String>, is_final: bool) -> bool {
        self.emit(EngineEvent::Result {
            transcript: transcript.into(),
            is_final,
        })
    }

    pub fn error(&self, code: &str) -> bool {
        self.emit(EngineEvent::Error(EngineErrorKind::from_code(code)))
    }

    pub fn ended(&self) -> bool {
        self.emit(EngineEvent::Ended)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No recognition service exists on this host.
    #[error("speech recognition is not available: {0}")]
    Unavailable(String),

    /// The instance refused to start.
    #[error("recognition failed to start: {0}")]
    Start(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One running recognition instance, exclusively owned by the session
/// manager.
pub trait RecognitionEngine: Send {
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stop listening.  Events emitted afterwards are ignored.
    fn stop(&mut self);
}

/// Factory for recognition instances.
pub trait EngineBackend: Send + Sync {
    fn create(
        &self,
        language: &str,
        events: EngineEvents,
    ) -> Result<Box<dyn RecognitionEngine>, EngineError>;
}

// Compile-time assertion: both traits must stay object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RecognitionEngine>, _: Box<dyn EngineBackend>) {}
};

// ---------------------------------------------------------------------------
// FakeBackend  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use fake::FakeBackend;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
