//! Configuration module for the participation tracker.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for the settings and snapshot files, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, MatchingConfig, RecognitionConfig, StoreConfig, VocabularyConfig};
