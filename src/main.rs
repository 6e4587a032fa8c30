//! Application entry point: terminal front end for the participation tracker.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Load the classroom snapshot and wrap it in a [`SharedClassroom`].
//! 4. Create a single-threaded [`tokio`] runtime.
//! 5. Build the notifier chain, the dispatcher and the session manager on a
//!    line-fed engine backend.
//! 6. Spawn the stdin reader thread.
//! 7. Route input lines until `:quit` or end of input.
//!
//! # Input
//!
//! * `:section add <name>`, `:select <name>`, `:student add <first> <last>`
//! * `:track on|off`, `:mode first|last|both`, `:visible`, `:grant`
//! * `:roster`, `:quit`
//! * `!<code>` injects an engine error (`!network`, `!not-allowed`, …)
//! * anything else is a finalized transcript

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::mpsc;

use participation_tracker::{
    config::AppConfig,
    dispatch::{TrackingState, TranscriptDispatcher},
    interpret::NameDetectionMode,
    notify::{ChannelNotifier, DedupNotifier, Notice, NoticeLevel, Notifier},
    session::{LineFeedBackend, SessionHandle, SessionManager},
    store::{ClassroomStore, SharedClassroom},
};

// ---------------------------------------------------------------------------
// Admin commands
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Quit,
}

struct Console {
    classroom: Arc<SharedClassroom>,
    dispatcher: Arc<TranscriptDispatcher>,
    session: SessionHandle,
    feed: mpsc::UnboundedSender<String>,
}

impl Console {
    fn handle_line(&self, line: &str) -> Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        match line.strip_prefix(':') {
            Some(cmd) => self.admin(cmd),
            None => {
                self.feed
                    .send(line.to_string())
                    .map_err(|_| anyhow!("recognition feed closed"))?;
                Ok(Flow::Continue)
            }
        }
    }

    fn admin(&self, cmd: &str) -> Result<Flow> {
        let words: Vec<&str> = cmd.split_whitespace().collect();
        match words.as_slice() {
            ["section", "add", name @ ..] if !name.is_empty() => {
                let name = name.join(" ");
                self.classroom.update(|s| Ok(s.add_section(&name, None)))?;
                println!("added section {name:?}");
            }
            ["select", name @ ..] if !name.is_empty() => {
                let name = name.join(" ");
                let id = self
                    .classroom
                    .lock()
                    .section_by_name(&name)
                    .map(|sec| sec.id)
                    .ok_or_else(|| anyhow!("no section named {name:?}"))?;
                self.classroom.update(|s| s.select_section(Some(id)))?;
                println!("selected {name:?}");
            }
            ["student", "add", first, last @ ..] if !last.is_empty() => {
                let last = last.join(" ");
                self.classroom.update(|s| {
                    let section = s.current_section;
                    s.add_student(first, &last, section)
                })?;
                println!("added {first} {last}");
            }
            ["track", "on"] => {
                self.classroom.request_start();
                if !self.classroom.is_tracking() {
                    bail!("select a section first");
                }
                self.session.begin();
                println!("tracking on");
            }
            ["track", "off"] => {
                self.classroom.request_stop();
                self.session.end();
                println!("tracking off");
            }
            ["mode", mode] => {
                let mode = NameDetectionMode::parse(mode)
                    .ok_or_else(|| anyhow!("mode must be first, last or both"))?;
                self.dispatcher.set_name_mode(mode);
                println!("name mode {mode:?}");
            }
            ["visible"] => {
                self.session.set_visible(true);
            }
            ["grant"] => {
                self.session.reset_permission();
                println!("microphone permission reset");
            }
            ["roster"] => self.print_roster(),
            ["quit"] => return Ok(Flow::Quit),
            _ => bail!("unknown command :{cmd}"),
        }
        Ok(Flow::Continue)
    }

    fn print_roster(&self) {
        let store = self.classroom.lock();
        let section = store
            .current_section
            .and_then(|id| store.section(id))
            .map_or("(none)".to_string(), |s| s.name.clone());
        println!(
            "section {section} | tracking {} | {}",
            if store.tracking { "on" } else { "off" },
            self.session.state().label()
        );
        for student in store
            .students
            .iter()
            .filter(|s| store.current_section.is_some() && s.section_id == store.current_section)
        {
            println!(
                "  #{:<2} {:<24} count {:<3} score {}",
                student.rank,
                format!("{}, {}", student.last_name, student.first_name),
                student.participation_count,
                student.total_score
            );
        }
    }
}

fn print_notice(notice: &Notice) {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    println!("[{tag}] {}", notice.message);
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("participation tracker starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Classroom
    let data_file = config.store.resolved_data_file();
    let store = ClassroomStore::load_from(&data_file).unwrap_or_else(|e| {
        log::warn!("Failed to load {} ({e}); starting empty", data_file.display());
        ClassroomStore::default()
    });
    let classroom = Arc::new(if config.store.autosave {
        SharedClassroom::with_autosave(store, data_file)
    } else {
        SharedClassroom::new(store)
    });

    // 4. Tokio runtime (single thread: callbacks never run concurrently)
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 5. Notices, dispatcher, session
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Notice>();
        let notifier: Arc<dyn Notifier> = Arc::new(DedupNotifier::new(
            ChannelNotifier::new(notice_tx),
            Duration::from_secs(config.recognition.notice_cooldown_secs),
        ));

        let dispatcher = Arc::new(TranscriptDispatcher::from_config(
            &config,
            classroom.clone(),
            classroom.clone(),
            classroom.clone(),
            Arc::clone(&notifier),
        ));

        let (feed, backend) = LineFeedBackend::channel();
        let (manager, session) = SessionManager::new(
            &config.recognition,
            Arc::new(backend),
            Arc::clone(&dispatcher),
            notifier,
        );
        let manager_task = tokio::spawn(manager.run());

        // 6. stdin reader thread
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
        std::thread::Builder::new()
            .name("stdin".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if input_tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("stdin read failed: {e}");
                            break;
                        }
                    }
                }
            })
            .context("failed to spawn stdin thread")?;

        let console = Console {
            classroom: classroom.clone(),
            dispatcher,
            session,
            feed,
        };

        if classroom.is_tracking() {
            console.session.begin();
        }

        // 7. Route input
        loop {
            tokio::select! {
                line = input_rx.recv() => {
                    let Some(line) = line else { break };
                    match console.handle_line(&line) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => break,
                        Err(e) => println!("[error] {e}"),
                    }
                }
                Some(notice) = notice_rx.recv() => print_notice(&notice),
            }
        }

        // Dropping the console drops the last session handle.
        drop(console);
        if let Err(e) = manager_task.await {
            log::warn!("session task failed: {e}");
        }
        while let Ok(notice) = notice_rx.try_recv() {
            print_notice(&notice);
        }
        log::info!("participation tracker shutting down");
        Ok::<(), anyhow::Error>(())
    })
}
