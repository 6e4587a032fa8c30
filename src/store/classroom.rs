//! In-memory classroom state with JSON snapshot persistence.
//!
//! [`ClassroomStore`] is plain data plus the operations the front end and
//! the dispatcher perform on it.  It is not thread-safe on its own; share it
//! through [`SharedClassroom`](crate::store::SharedClassroom).

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::interpret::{Candidate, QualityLevel};

use super::model::{ParticipationRecord, Section, Student};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors returned by classroom operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown section {0}")]
    UnknownSection(Uuid),

    #[error("unknown student {0}")]
    UnknownStudent(Uuid),

    #[error("cannot delete protected student {0}")]
    ProtectedStudent(String),

    #[error("no section selected")]
    NoSectionSelected,

    #[error("tracking is not active")]
    NotTracking,

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// ClassroomStore
// ---------------------------------------------------------------------------

/// Sections, students, participation history and the tracking flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassroomStore {
    pub sections: Vec<Section>,
    pub students: Vec<Student>,
    pub records: Vec<ParticipationRecord>,
    pub current_section: Option<Uuid>,
    /// Tracking always starts off after a reload.
    #[serde(skip)]
    pub tracking: bool,
}

impl ClassroomStore {
    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load a snapshot, or an empty store when the file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write a pretty-printed snapshot, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------------

    pub fn add_section(&mut self, name: &str, description: Option<&str>) -> Uuid {
        let section = Section {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = section.id;
        log::info!("store: added section {:?}", section.name);
        self.sections.push(section);
        id
    }

    /// Remove a section.  Its students become unassigned and the selection
    /// is cleared if it pointed at the removed section.
    pub fn remove_section(&mut self, id: Uuid) -> Result<(), StoreError> {
        let before = self.sections.len();
        self.sections.retain(|s| s.id != id);
        if self.sections.len() == before {
            return Err(StoreError::UnknownSection(id));
        }
        for student in self.students.iter_mut().filter(|s| s.section_id == Some(id)) {
            student.section_id = None;
        }
        if self.current_section == Some(id) {
            self.current_section = None;
        }
        Ok(())
    }

    pub fn section(&self, id: Uuid) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Select the current section, or clear the selection with `None`.
    pub fn select_section(&mut self, id: Option<Uuid>) -> Result<(), StoreError> {
        if let Some(id) = id {
            if self.section(id).is_none() {
                return Err(StoreError::UnknownSection(id));
            }
        }
        self.current_section = id;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Students
    // -----------------------------------------------------------------------

    /// Add a student.  New students are protected.
    pub fn add_student(
        &mut self,
        first_name: &str,
        last_name: &str,
        section_id: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        if let Some(section) = section_id {
            if self.section(section).is_none() {
                return Err(StoreError::UnknownSection(section));
            }
        }
        let student = Student {
            id: Uuid::new_v4(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            section_id,
            participation_count: 0,
            total_score: 0,
            last_participation: None,
            rank: 0,
            protected: true,
        };
        let id = student.id;
        log::info!("store: added student {}", student.full_name());
        self.students.push(student);
        Ok(id)
    }

    pub fn student(&self, id: Uuid) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    fn student_mut(&mut self, id: Uuid) -> Result<&mut Student, StoreError> {
        self.students
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::UnknownStudent(id))
    }

    /// Remove an unprotected student together with their records.
    pub fn remove_student(&mut self, id: Uuid) -> Result<(), StoreError> {
        let student = self.student(id).ok_or(StoreError::UnknownStudent(id))?;
        if student.protected {
            return Err(StoreError::ProtectedStudent(student.full_name()));
        }
        self.students.retain(|s| s.id != id);
        self.records.retain(|r| r.student_id != id);
        Ok(())
    }

    /// Flip protection and return the new value.
    pub fn toggle_protection(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let student = self.student_mut(id)?;
        student.protected = !student.protected;
        Ok(student.protected)
    }

    pub fn move_student(&mut self, id: Uuid, section_id: Option<Uuid>) -> Result<(), StoreError> {
        if let Some(section) = section_id {
            if self.section(section).is_none() {
                return Err(StoreError::UnknownSection(section));
            }
        }
        self.student_mut(id)?.section_id = section_id;
        Ok(())
    }

    /// Roster of the current section, in insertion order.  Empty when no
    /// section is selected.
    pub fn candidates(&self) -> Vec<Candidate> {
        let Some(section) = self.current_section else {
            return Vec::new();
        };
        self.students
            .iter()
            .filter(|s| s.section_id == Some(section))
            .map(Student::as_candidate)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Tracking
    // -----------------------------------------------------------------------

    pub fn start_tracking(&mut self) -> Result<(), StoreError> {
        if self.current_section.is_none() {
            return Err(StoreError::NoSectionSelected);
        }
        self.tracking = true;
        Ok(())
    }

    pub fn stop_tracking(&mut self) {
        self.tracking = false;
    }

    // -----------------------------------------------------------------------
    // Participation
    // -----------------------------------------------------------------------

    /// Append a participation record and update the student's totals and
    /// the section ranking.
    pub fn record_participation(
        &mut self,
        student_id: Uuid,
        duration_secs: u32,
        quality: &QualityLevel,
        keywords: Vec<String>,
        confidence: f32,
    ) -> Result<Uuid, StoreError> {
        if !self.tracking {
            return Err(StoreError::NotTracking);
        }
        let now = Utc::now();
        let student = self.student_mut(student_id)?;
        student.participation_count += 1;
        student.total_score += u32::from(quality.score);
        student.last_participation = Some(now);

        let record = ParticipationRecord {
            id: Uuid::new_v4(),
            student_id,
            timestamp: now,
            duration_secs,
            quality: quality.clone(),
            keywords,
            confidence,
        };
        let id = record.id;
        self.records.push(record);
        self.update_rankings();
        Ok(id)
    }

    /// Rank students of the current section (all students when none is
    /// selected) by descending total score.  Equal totals keep roster order.
    pub fn update_rankings(&mut self) {
        let section = self.current_section;
        let in_scope = |s: &Student| section.is_none() || s.section_id == section;

        let mut ordered: Vec<(Uuid, u32)> = self
            .students
            .iter()
            .filter(|s| in_scope(*s))
            .map(|s| (s.id, s.total_score))
            .collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));

        for (idx, (id, _)) in ordered.iter().enumerate() {
            if let Some(student) = self.students.iter_mut().find(|s| s.id == *id) {
                let rank = idx as u32 + 1;
                if student.rank != 0 && student.rank != rank {
                    log::debug!(
                        "store: {} moved from rank {} to {}",
                        student.full_name(),
                        student.rank,
                        rank
                    );
                }
                student.rank = rank;
            }
        }
    }

    pub fn records_for(&self, student_id: Uuid) -> impl Iterator<Item = &ParticipationRecord> {
        self.records.iter().filter(move |r| r.student_id == student_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
