//! User-visible notices.
//!
//! The core never blocks on notifications: [`Notifier::notify`] is a plain
//! synchronous call that implementations must keep cheap.
//!
//! * [`LogNotifier`]: writes notices to the `log` facade.
//! * [`ChannelNotifier`]: forwards notices to a `tokio` channel (used by the
//!   terminal front end).
//! * [`DedupNotifier`]: wraps any notifier and drops keyed notices that
//!   repeat within a cooldown window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    /// Stable identifier for de-duplication (e.g. `"mic-permission"`).
    pub key: &'static str,
    pub message: String,
}

impl Notice {
    pub fn info(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            key,
            message: message.into(),
        }
    }

    pub fn success(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            key,
            message: message.into(),
        }
    }

    pub fn error(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            key,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier trait
// ---------------------------------------------------------------------------

/// Fire-and-forget sink for [`Notice`]s.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => log::error!("notice [{}]: {}", notice.key, notice.message),
            _ => log::info!("notice [{}]: {}", notice.key, notice.message),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelNotifier
// ---------------------------------------------------------------------------

/// Forwards notices over an unbounded channel.  A closed receiver is not an
/// error; the notice is simply dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notice>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

// ---------------------------------------------------------------------------
// DedupNotifier
// ---------------------------------------------------------------------------

/// Suppresses a notice when another with the same key was forwarded less
/// than `cooldown` ago.
pub struct DedupNotifier<N: Notifier> {
    inner: N,
    cooldown: Duration,
    last_sent: Mutex<HashMap<&'static str, Instant>>,
}

impl<N: Notifier> DedupNotifier<N> {
    pub fn new(inner: N, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }
}

impl<N: Notifier> Notifier for DedupNotifier<N> {
    fn notify(&self, notice: Notice) {
        let now = Instant::now();
        {
            let mut last = match self.last_sent.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(prev) = last.get(notice.key) {
                if now.duration_since(*prev) < self.cooldown {
                    log::debug!("notice [{}] suppressed (repeat)", notice.key);
                    return;
                }
            }
            last.insert(notice.key, now);
        }
        self.inner.notify(notice);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_notifier_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let n = ChannelNotifier::new(tx);
        n.notify(Notice::info("k", "hello"));
        let got = rx.try_recv().unwrap();
        assert_eq!(got.message, "hello");
        assert_eq!(got.level, NoticeLevel::Info);
    }

    #[test]
    fn channel_notifier_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelNotifier::new(tx).notify(Notice::error("k", "nobody listening"));
    }

    #[test]
    fn dedup_drops_repeats_within_cooldown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let n = DedupNotifier::new(ChannelNotifier::new(tx), Duration::from_secs(60));
        n.notify(Notice::error("mic", "denied"));
        n.notify(Notice::error("mic", "denied again"));
        n.notify(Notice::info("other", "different key"));

        assert_eq!(rx.try_recv().unwrap().message, "denied");
        assert_eq!(rx.try_recv().unwrap().key, "other");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dedup_with_zero_cooldown_passes_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let n = DedupNotifier::new(ChannelNotifier::new(tx), Duration::ZERO);
        n.notify(Notice::info("k", "a"));
        n.notify(Notice::info("k", "b"));
        assert_eq!(rx.try_recv().unwrap().message, "a");
        assert_eq!(rx.try_recv().unwrap().message, "b");
    }

    #[test]
    fn notifiers_are_object_safe() {
        let _: Box<dyn Notifier> = Box::new(LogNotifier);
        let _: Box<dyn Notifier> = Box::new(DedupNotifier::new(LogNotifier, Duration::ZERO));
    }
}
