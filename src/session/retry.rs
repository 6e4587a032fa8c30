//! Retry delays for engine errors.
//!
//! Transient errors (`network`, `no-speech`) retry on a fixed short delay.
//! Other errors back off exponentially, capped at `max_delay`, for at most
//! `max_attempts` consecutive failures; after that the caller gets
//! [`Backoff::Exhausted`] and the counter starts over.

use std::time::Duration;

use crate::config::RecognitionConfig;

use super::engine::EngineErrorKind;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub network_delay: Duration,
    pub no_speech_delay: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_attempts: u32,
    pub final_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RecognitionConfig::default())
    }
}

impl From<&RecognitionConfig> for RetryConfig {
    fn from(cfg: &RecognitionConfig) -> Self {
        Self {
            network_delay: cfg.network_retry(),
            no_speech_delay: cfg.no_speech_retry(),
            initial_delay: Duration::from_millis(cfg.backoff_initial_ms),
            max_delay: Duration::from_millis(cfg.backoff_max_ms),
            backoff_multiplier: cfg.backoff_multiplier,
            max_attempts: cfg.max_retry_attempts,
            final_delay: cfg.final_retry(),
        }
    }
}

/// What to do about one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry after `delay`; `attempt` counts from 1.
    Retry { delay: Duration, attempt: u32 },
    /// The cap was reached.  The counter has been reset.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    consecutive_failures: u32,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn attempts(&self) -> u32 {
        self.consecutive_failures
    }

    /// Fixed delay for errors that never count against the cap.
    pub fn transient_delay(&self, kind: &EngineErrorKind) -> Option<Duration> {
        match kind {
            EngineErrorKind::Network => Some(self.config.network_delay),
            EngineErrorKind::NoSpeech => Some(self.config.no_speech_delay),
            _ => None,
        }
    }

    /// Register one failure and return the backoff for it.
    pub fn next_backoff(&mut self) -> Backoff {
        if self.consecutive_failures >= self.config.max_attempts {
            self.consecutive_failures = 0;
            return Backoff::Exhausted;
        }
        self.consecutive_failures += 1;
        let exp = self.consecutive_failures.saturating_sub(1) as i32;
        let millis =
            self.config.initial_delay.as_millis() as f64 * self.config.backoff_multiplier.powi(exp);
        let delay = Duration::from_millis(millis as u64).min(self.config.max_delay);
        Backoff::Retry {
            delay,
            attempt: self.consecutive_failures,
        }
    }

    pub fn final_delay(&self) -> Duration {
        self.config.final_delay
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
