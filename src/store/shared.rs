//! Thread-safe handle over [`ClassroomStore`] with optional autosave.
//!
//! [`SharedClassroom`] is the concrete collaborator handed to the
//! dispatcher: it implements [`TrackingState`], [`RosterProvider`] and
//! [`ParticipationSink`] on top of the store.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::dispatch::{
    ParticipationEvent, ParticipationSink, RosterProvider, SinkError, TrackingState,
};
use crate::interpret::Candidate;

use super::classroom::{ClassroomStore, StoreError};

/// Cloneable, lock-protected classroom store.
#[derive(Clone, Default)]
pub struct SharedClassroom {
    inner: Arc<Mutex<ClassroomStore>>,
    autosave: Option<PathBuf>,
}

impl SharedClassroom {
    pub fn new(store: ClassroomStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            autosave: None,
        }
    }

    /// Persist a snapshot to `path` after every successful [`update`](Self::update).
    pub fn with_autosave(store: ClassroomStore, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            autosave: Some(path),
        }
    }

    /// Lock the store for reading.  A poisoned lock is recovered since the
    /// store holds no invariants a panicking writer could half-apply.
    pub fn lock(&self) -> MutexGuard<'_, ClassroomStore> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a mutation and autosave on success.
    ///
    /// A failed autosave is logged and does not undo the mutation.
    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut ClassroomStore) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut store = self.lock();
        let out = f(&mut store)?;
        if let Some(path) = &self.autosave {
            if let Err(e) = store.save_to(path) {
                log::warn!("store: autosave to {} failed: {e}", path.display());
            }
        }
        Ok(out)
    }

    /// Write a snapshot now, regardless of the autosave setting.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), StoreError> {
        self.lock().save_to(path)
    }
}

impl TrackingState for SharedClassroom {
    fn is_tracking(&self) -> bool {
        self.lock().tracking
    }

    fn current_section(&self) -> Option<String> {
        self.lock().current_section.map(|id| id.to_string())
    }

    fn request_start(&self) {
        if let Err(e) = self.update(|s| s.start_tracking()) {
            log::warn!("store: cannot start tracking: {e}");
        }
    }

    fn request_stop(&self) {
        // The tracking flag is not part of the snapshot, so nothing to save.
        self.lock().stop_tracking();
    }
}

impl RosterProvider for SharedClassroom {
    fn candidates(&self) -> Vec<Candidate> {
        self.lock().candidates()
    }
}

#[async_trait]
impl ParticipationSink for SharedClassroom {
    async fn record(
        &self,
        event: &ParticipationEvent,
        duration_secs: u32,
    ) -> Result<(), SinkError> {
        let student_id = Uuid::parse_str(&event.student.id)
            .map_err(|_| SinkError::Rejected(format!("bad student id {:?}", event.student.id)))?;

        let result = self.update(|s| {
            s.record_participation(
                student_id,
                duration_secs,
                &event.quality,
                event.matched_keywords.clone(),
                event.confidence,
            )
        });

        match result {
            Ok(record) => {
                log::info!(
                    "store: recorded {} for {} ({record})",
                    event.quality.keyword,
                    event.student.display_name()
                );
                Ok(())
            }
            Err(e @ (StoreError::NotTracking | StoreError::UnknownStudent(_))) => {
                Err(SinkError::Rejected(e.to_string()))
            }
            Err(e) => Err(SinkError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
