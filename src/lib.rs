//! Voice-driven classroom participation tracking.
//!
//! A continuous recognition session ([`session`]) feeds finalized
//! transcripts to the [`dispatch`] layer, which uses [`interpret`] to spot
//! start/stop commands and "name + trigger + quality" utterances, and
//! records the resulting participation events in the classroom [`store`].

pub mod config;
pub mod dispatch;
pub mod interpret;
pub mod notify;
pub mod session;
pub mod store;
