use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::filter::PathFilter;
use crate::launcher::{CompletionNotice, Launch, Sink};
use crate::watcher::event::ChangeEvent;

/// Whether a command is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Counters kept by the coordinator over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Commands started.
    pub launched: usize,
    /// Events rejected by the path filter.
    pub filtered: usize,
    /// Events discarded because a command was running.
    pub dropped_busy: usize,
    /// Commands that ended in failure (including failure to start).
    pub failed: usize,
}

/// The single decision loop: turns change events into command launches, with
/// at most one command in flight.
pub struct Coordinator<L> {
    config: WatchConfig,
    filter: PathFilter,
    launcher: L,
    sink: Sink,
    state: RunState,
    stats: LoopStats,
}

impl<L: Launch> Coordinator<L> {
    /// `sink` receives the one-line diagnostic written for each failed command.
    pub fn new(config: WatchConfig, launcher: L, sink: Sink) -> Self {
        let filter = PathFilter::new(config.pattern.clone());
        Self {
            config,
            filter,
            launcher,
            sink,
            state: RunState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Consume change events until the source closes.
    ///
    /// Change events and completion notices are serviced in a fair order when
    /// both are ready. Once `events` is closed the loop waits for any in-flight
    /// command to finish, then returns its counters. It never ends while the
    /// source is alive.
    pub async fn run(mut self, mut events: mpsc::Receiver<ChangeEvent>) -> LoopStats {
        // Holding the sender keeps `done_rx` open for the whole loop.
        let (done_tx, mut done_rx) = mpsc::channel::<CompletionNotice>(1);
        let mut events_open = true;

        loop {
            if !events_open && self.state == RunState::Idle {
                break;
            }
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_change(event, &done_tx),
                    None => {
                        warn!("change event source closed");
                        events_open = false;
                    }
                },
                Some(notice) = done_rx.recv() => self.on_completion(notice).await,
            }
        }

        self.stats
    }

    fn on_change(&mut self, event: ChangeEvent, done: &mpsc::Sender<CompletionNotice>) {
        if self.state == RunState::Running {
            self.stats.dropped_busy += 1;
            debug!(path = %event.path.display(), "change dropped: command running");
            return;
        }
        if !self.filter.matches(&event.path_str()) {
            self.stats.filtered += 1;
            debug!(path = %event.path.display(), "change dropped: no pattern match");
            return;
        }

        let command = self.config.command_for(&event.path);
        info!(path = %event.path.display(), command = %command, "running command");
        self.launcher.launch(command, done.clone());
        self.stats.launched += 1;
        self.state = RunState::Running;
    }

    async fn on_completion(&mut self, notice: CompletionNotice) {
        if self.state == RunState::Idle {
            warn!(command = %notice.command, "completion received while idle");
        }
        self.state = RunState::Idle;

        if notice.outcome.is_success() {
            debug!(command = %notice.command, "command succeeded");
            return;
        }
        self.stats.failed += 1;
        let line = format!("watch: {:?} failed: {}", notice.command.as_str(), notice.outcome);
        if let Err(err) = self.sink.write_line(&line).await {
            warn!(error = %err, "failed to write diagnostic");
        }
    }
}
