//! Classroom data: sections, students, participation records and the
//! tracking flags, persisted as a JSON snapshot.

pub mod classroom;
pub mod model;
pub mod shared;

pub use classroom::{ClassroomStore, StoreError};
pub use model::{ParticipationRecord, Section, Student};
pub use shared::SharedClassroom;
