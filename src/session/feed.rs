//! Line-fed recognition backend.
//!
//! Stands in for a live speech engine: every line pushed into the shared
//! channel is one finalized transcript.  A line starting with `!` is an
//! engine error code (`!network`, `!not-allowed`, …); the instance reports
//! the error, then `ended`, and stops reading.
//!
//! Lines that arrive while no instance is running stay queued for the next
//! one.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::engine::{EngineBackend, EngineError, EngineEvents, RecognitionEngine};

/// Backend whose instances read from one shared line channel.
#[derive(Clone)]
pub struct LineFeedBackend {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl LineFeedBackend {
    /// Create the backend and the sender that feeds it.
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                lines: Arc::new(Mutex::new(rx)),
            },
        )
    }
}

impl EngineBackend for LineFeedBackend {
    fn create(
        &self,
        language: &str,
        events: EngineEvents,
    ) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        log::debug!(
            "session: line feed instance #{} ({language})",
            events.generation()
        );
        Ok(Box::new(LineFeedEngine {
            lines: Arc::clone(&self.lines),
            events,
            task: None,
        }))
    }
}

struct LineFeedEngine {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    events: EngineEvents,
    task: Option<JoinHandle<()>>,
}

impl RecognitionEngine for LineFeedEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        if self.task.is_some() {
            return Err(EngineError::Start("instance already started".into()));
        }
        let lines = Arc::clone(&self.lines);
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let mut lines = lines.lock().await;
            if !events.started() {
                return;
            }
            while let Some(line) = lines.recv().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(code) = line.strip_prefix('!') {
                    events.error(code);
                    events.ended();
                    return;
                }
                if !events.result(line.to_lowercase(), true) {
                    return;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LineFeedEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::engine::{EngineErrorKind, EngineEvent, StampedEvent};

    async fn next(rx: &mut mpsc::UnboundedReceiver<StampedEvent>) -> EngineEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
            .event
    }

    #[tokio::test]
    async fn lines_become_final_results() {
        let (feed, backend) = LineFeedBackend::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = backend.create("en-US", EngineEvents::new(1, tx)).unwrap();
        engine.start().unwrap();

        feed.send("Smith Answers Good".into()).unwrap();
        assert_eq!(next(&mut rx).await, EngineEvent::Started);
        assert_eq!(
            next(&mut rx).await,
            EngineEvent::Result {
                transcript: "smith answers good".into(),
                is_final: true
            }
        );
    }

    #[tokio::test]
    async fn bang_lines_are_errors_followed_by_end() {
        let (feed, backend) = LineFeedBackend::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = backend.create("en-US", EngineEvents::new(1, tx)).unwrap();
        engine.start().unwrap();

        feed.send("!network".into()).unwrap();
        assert_eq!(next(&mut rx).await, EngineEvent::Started);
        assert_eq!(
            next(&mut rx).await,
            EngineEvent::Error(EngineErrorKind::Network)
        );
        assert_eq!(next(&mut rx).await, EngineEvent::Ended);
    }

    #[tokio::test]
    async fn queued_lines_go_to_the_next_instance() {
        let (feed, backend) = LineFeedBackend::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut first = backend.create("en-US", EngineEvents::new(1, tx.clone())).unwrap();
        first.start().unwrap();
        assert_eq!(next(&mut rx).await, EngineEvent::Started);
        first.stop();

        feed.send("garcia participates".into()).unwrap();
        let mut second = backend.create("en-US", EngineEvents::new(2, tx)).unwrap();
        second.start().unwrap();

        let started = rx.recv().await.unwrap();
        assert_eq!(started.generation, 2);
        let result = rx.recv().await.unwrap();
        assert_eq!(result.generation, 2);
    }

    #[tokio::test]
    async fn double_start_is_refused() {
        let (_feed, backend) = LineFeedBackend::channel();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = backend.create("en-US", EngineEvents::new(1, tx)).unwrap();
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::Start(_))));
    }
}
