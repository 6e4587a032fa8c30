//! Transcript interpretation: commands, qualities and student names.
//!
//! This module provides:
//! * [`command`]: start/stop phrase matching and participation triggers.
//! * [`QualityCatalog`] / [`QualityLevel`]: scored quality keywords with
//!   overlap-aware extraction.
//! * [`NameResolver`]: weighted, mode-sensitive roster matching.
//!
//! All functions are pure: the roster and catalog are passed in by the
//! caller and never mutated.
//!
//! # Quick start
//!
//! ```rust
//! use participation_tracker::interpret::{
//!     command, Candidate, NameDetectionMode, NameResolver, QualityCatalog,
//! };
//!
//! let transcript = "smith answers very good";
//! assert!(!command::matches(transcript, command::START_PHRASES));
//!
//! let roster = vec![Candidate::new("s1", "John", "Smith")];
//! let who = NameResolver::default().resolve(transcript, &roster, NameDetectionMode::Both);
//! let how = QualityCatalog::default().extract(transcript).map(|q| q.score);
//!
//! assert_eq!(who.map(|m| m.candidate.id.as_str()), Some("s1"));
//! assert_eq!(how, Some(4));
//! ```

pub mod command;
pub mod names;
pub mod quality;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use names::{Candidate, NameDetectionMode, NameMatch, NameResolver, NameWeights};
pub use quality::{QualityCatalog, QualityLevel};
