//! Progress and status reporting.
//!
//! Analyzers report through a [`ProgressSink`]: an integer percentage that
//! never decreases within a run, and free-text status lines naming the
//! current phase and, once a batch has finished, an ETA.

use pulse_common::util::format_duration_ms;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receiver of progress updates.
pub trait ProgressSink: Send + Sync {
    /// Percentage in [0, 100].
    fn progress(&self, percent: u8);

    /// Human-readable phase description.
    fn status(&self, message: &str);
}

/// Discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn progress(&self, _percent: u8) {}

    fn status(&self, _message: &str) {}
}

/// Writes updates to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn progress(&self, percent: u8) {
        debug!(percent, "Progress");
    }

    fn status(&self, message: &str) {
        info!("{}", message);
    }
}

/// Update delivered through [`ChannelProgress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(u8),
    Status(String),
}

/// Forwards updates to an unbounded channel. Sends after the receiver is
/// dropped are ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn progress(&self, percent: u8) {
        let _ = self.tx.send(ProgressEvent::Progress(percent));
    }

    fn status(&self, message: &str) {
        let _ = self.tx.send(ProgressEvent::Status(message.to_string()));
    }
}

// ============================================================================
// ProgressTracker
// ============================================================================

/// Per-run progress bookkeeping on top of a sink.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    total: usize,
    completed: usize,
    last_percent: u8,
    started: Instant,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        Self {
            sink,
            total,
            completed: 0,
            last_percent: 0,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Report a phase change without moving the percentage.
    pub fn phase(&self, name: &str) {
        self.sink.status(name);
    }

    /// `round(100 * completed / total)`, never below the last reported value.
    pub fn percent(&self) -> u8 {
        let raw = if self.total == 0 {
            100
        } else {
            ((100.0 * self.completed as f64 / self.total as f64).round() as u64).min(100) as u8
        };
        raw.max(self.last_percent)
    }

    /// Remaining time estimate: `(total - completed) * elapsed / completed`.
    pub fn eta_ms(&self) -> Option<u64> {
        eta_ms(self.total, self.completed, self.elapsed_ms())
    }

    /// Record `items` more processed items and report.
    pub fn advance(&mut self, items: usize, phase: &str) {
        self.completed = (self.completed + items).min(self.total);
        let percent = self.percent();
        self.last_percent = percent;
        self.sink.progress(percent);

        let message = match self.eta_ms() {
            Some(eta) if self.completed < self.total => format!(
                "{phase}: {}/{} texts, about {} remaining",
                self.completed,
                self.total,
                format_duration_ms(eta)
            ),
            _ => format!("{phase}: {}/{} texts", self.completed, self.total),
        };
        self.sink.status(&message);
    }

    /// Report completion.
    pub fn finish(&mut self, message: &str) {
        self.last_percent = 100;
        self.sink.progress(100);
        self.sink.status(message);
    }
}

/// ETA in milliseconds, `None` until at least one item has completed.
pub fn eta_ms(total: usize, completed: usize, elapsed_ms: u64) -> Option<u64> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as u64;
    Some(remaining * elapsed_ms / completed as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        percents: Mutex<Vec<u8>>,
        statuses: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorder {
        fn progress(&self, percent: u8) {
            self.percents.lock().unwrap().push(percent);
        }

        fn status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_eta_formula() {
        assert_eq!(eta_ms(10, 0, 500), None);
        assert_eq!(eta_ms(10, 2, 1000), Some(4000));
        assert_eq!(eta_ms(10, 10, 1000), Some(0));
    }

    #[test]
    fn test_percent_rounds_and_never_decreases() {
        let rec = Recorder::default();
        let mut tracker = ProgressTracker::new(&rec, 3);
        tracker.advance(1, "Analyzing");
        tracker.advance(1, "Analyzing");
        tracker.advance(1, "Analyzing");
        tracker.finish("Done");

        let percents = rec.percents.lock().unwrap().clone();
        assert_eq!(percents, vec![33, 67, 100, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_status_mentions_phase_and_eta() {
        let rec = Recorder::default();
        let mut tracker = ProgressTracker::new(&rec, 4);
        tracker.phase("Loading models");
        tracker.advance(2, "Analyzing");

        let statuses = rec.statuses.lock().unwrap().clone();
        assert_eq!(statuses[0], "Loading models");
        assert!(statuses[1].starts_with("Analyzing: 2/4 texts"));
        assert!(statuses[1].contains("remaining"));
    }

    #[test]
    fn test_empty_run_is_complete() {
        let tracker = ProgressTracker::new(&NoopProgress, 0);
        assert_eq!(tracker.percent(), 100);
    }

    #[tokio::test]
    async fn test_channel_progress() {
        let (sink, mut rx) = ChannelProgress::new();
        sink.progress(50);
        sink.status("halfway");
        assert_eq!(rx.recv().await, Some(ProgressEvent::Progress(50)));
        assert_eq!(rx.recv().await, Some(ProgressEvent::Status("halfway".into())));
    }
}
