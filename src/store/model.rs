//! Classroom records: sections, students and participation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interpret::{Candidate, QualityLevel};

/// A class section (period, group…).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A roster entry with running participation totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub section_id: Option<Uuid>,
    pub participation_count: u32,
    pub total_score: u32,
    pub last_participation: Option<DateTime<Utc>>,
    /// 1 = highest total in the section; 0 = not ranked yet.
    pub rank: u32,
    /// Protected students cannot be removed.
    pub protected: bool,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn as_candidate(&self) -> Candidate {
        Candidate::new(self.id.to_string(), &self.first_name, &self.last_name)
    }
}

/// One scored participation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: u32,
    pub quality: QualityLevel,
    pub keywords: Vec<String>,
    pub confidence: f32,
}
