//! Cancellable, keyed session timers.
//!
//! At most one timer per [`TimerKind`] is pending.  Scheduling a kind aborts
//! the previous task for that kind.  Each fire carries the ticket it was
//! scheduled with; [`Timers::accept`] rejects tickets that were superseded
//! or cancelled, so a timer that raced its own cancellation is ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Forced stop/restart after a dispatched result.
    RestartAfterResult,
    /// Reconnect after an engine error.
    Retry,
    /// Periodic stalled-session check.
    Watchdog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub ticket: u64,
}

pub struct Timers {
    tx: mpsc::UnboundedSender<TimerFired>,
    pending: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    next_ticket: u64,
}

impl Timers {
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel(kind);
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, ticket });
        });
        log::trace!("session: timer {kind:?} #{ticket} in {delay:?}");
        self.pending.insert(kind, (ticket, handle));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, handle)) = self.pending.remove(&kind) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }

    /// `true` if `fired` is the live timer of its kind; consumes it.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.pending.get(&fired.kind) {
            Some((ticket, _)) if *ticket == fired.ticket => {
                self.pending.remove(&fired.kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timers() -> (Timers, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Timers::new(tx), rx)
    }

    #[tokio::test]
    async fn fires_once_and_is_accepted() {
        let (mut timers, mut rx) = timers();
        timers.schedule(TimerKind::Retry, Duration::from_millis(5));
        assert!(timers.is_pending(TimerKind::Retry));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::Retry);
        assert!(timers.accept(fired));
        assert!(!timers.accept(fired));
        assert!(!timers.is_pending(TimerKind::Retry));
    }

    #[tokio::test]
    async fn rescheduling_supersedes_previous_ticket() {
        let (mut timers, mut rx) = timers();
        timers.schedule(TimerKind::Retry, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The first timer already fired; scheduling again makes it stale.
        timers.schedule(TimerKind::Retry, Duration::from_millis(1));

        let first = rx.recv().await.unwrap();
        assert!(!timers.accept(first));
        let second = rx.recv().await.unwrap();
        assert!(timers.accept(second));
    }

    #[tokio::test]
    async fn cancel_all_silences_every_kind() {
        let (mut timers, mut rx) = timers();
        timers.schedule(TimerKind::Retry, Duration::from_millis(5));
        timers.schedule(TimerKind::Watchdog, Duration::from_millis(5));
        timers.cancel_all();

        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err(), "no timer may fire after cancel_all");
    }

    #[tokio::test]
    async fn kinds_are_independent() {
        let (mut timers, mut rx) = timers();
        timers.schedule(TimerKind::Watchdog, Duration::from_millis(5));
        timers.schedule(TimerKind::Retry, Duration::from_millis(5));
        timers.cancel(TimerKind::Retry);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::Watchdog);
        assert!(timers.accept(fired));
    }
}
