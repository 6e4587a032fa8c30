//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every field has a default, so a partial `settings.toml` is valid.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::interpret::command::{PARTICIPATION_TRIGGERS, START_PHRASES, STOP_PHRASES};
use crate::interpret::{NameDetectionMode, NameWeights};

use super::AppPaths;

// ---------------------------------------------------------------------------
// RecognitionConfig
// ---------------------------------------------------------------------------

/// Timing and retry settings for the continuous recognition session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// BCP-47 language tag handed to the speech engine.
    pub language: String,
    /// Delay before the forced stop/restart that follows every result.
    pub restart_delay_ms: u64,
    /// Retry delay after a `network` error.
    pub network_retry_ms: u64,
    /// Retry delay after a `no-speech` error.
    pub no_speech_retry_ms: u64,
    /// First backoff delay for other errors.
    pub backoff_initial_ms: u64,
    /// Growth factor applied per consecutive failure.
    pub backoff_multiplier: f64,
    /// Upper bound on any backoff delay.
    pub backoff_max_ms: u64,
    /// Consecutive failures retried with backoff before the user is told.
    pub max_retry_attempts: u32,
    /// Delay of the last attempt made after the retry cap is reached.
    pub final_retry_ms: u64,
    /// Period of the stalled-session check while tracking.
    pub watchdog_interval_ms: u64,
    /// Repeated notices with the same key are dropped within this window.
    pub notice_cooldown_secs: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".into(),
            restart_delay_ms: 150,
            network_retry_ms: 300,
            no_speech_retry_ms: 100,
            backoff_initial_ms: 100,
            backoff_multiplier: 1.5,
            backoff_max_ms: 300,
            max_retry_attempts: 5,
            final_retry_ms: 2_000,
            watchdog_interval_ms: 3_000,
            notice_cooldown_secs: 10,
        }
    }
}

impl RecognitionConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn network_retry(&self) -> Duration {
        Duration::from_millis(self.network_retry_ms)
    }

    pub fn no_speech_retry(&self) -> Duration {
        Duration::from_millis(self.no_speech_retry_ms)
    }

    pub fn final_retry(&self) -> Duration {
        Duration::from_millis(self.final_retry_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// MatchingConfig
// ---------------------------------------------------------------------------

/// Settings for name resolution and the events it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Which parts of a name the instructor says.
    pub name_mode: NameDetectionMode,
    /// Confidence attached to every participation event.
    pub confidence: f32,
    /// Duration, in seconds, recorded with every participation event.
    pub duration_secs: u32,
    /// Hand-tuned resolver weights.
    pub weights: NameWeights,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            name_mode: NameDetectionMode::default(),
            confidence: 0.8,
            duration_secs: 60,
            weights: NameWeights::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// VocabularyConfig
// ---------------------------------------------------------------------------

/// Spoken phrase sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub start_phrases: Vec<String>,
    pub stop_phrases: Vec<String>,
    /// Words that mark an utterance as being about participation.
    pub triggers: Vec<String>,
    /// Extra spoken synonyms keyed by quality keyword
    /// (e.g. `excellent = ["outstanding"]`).
    pub quality_synonyms: BTreeMap<String, Vec<String>>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            start_phrases: owned(START_PHRASES),
            stop_phrases: owned(STOP_PHRASES),
            triggers: owned(PARTICIPATION_TRIGGERS),
            quality_synonyms: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Classroom snapshot persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot path; `None` means the platform data directory.
    pub data_file: Option<PathBuf>,
    /// Save after every change.
    pub autosave: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            autosave: true,
        }
    }
}

impl StoreConfig {
    /// The snapshot path to use, falling back to [`AppPaths::classroom_file`].
    pub fn resolved_data_file(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| AppPaths::new().classroom_file)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use participation_tracker::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recognition session timing.
    pub recognition: RecognitionConfig,
    /// Name matching.
    pub matching: MatchingConfig,
    /// Command, trigger and quality phrases.
    pub vocabulary: VocabularyConfig,
    /// Snapshot persistence.
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
