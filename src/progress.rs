//! Progress reporting
//!
//! Long running operations report through a [`ProgressReporter`] handed to
//! them in the [`ProcessingConfig`](crate::config::ProcessingConfig). The
//! default is [`NoProgress`], which discards every update.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::info;

/// Receives progress updates from block iteration, tile clumping and
/// outlier screening.
///
/// Implementations must be callable from worker threads.
pub trait ProgressReporter: Send + Sync {
    /// A new task with `total` units of work starts.
    fn start(&self, label: &str, total: usize);

    /// `units` more units of work completed.
    fn advance(&self, units: usize);

    /// The current task completed.
    fn finish(&self);
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _label: &str, _total: usize) {}

    fn advance(&self, _units: usize) {}

    fn finish(&self) {}
}

/// Writes progress through the `log` facade every `step_percent` percent.
#[derive(Debug)]
pub struct LogProgress {
    step_percent: usize,
    state: Mutex<LogProgressState>,
    done: AtomicUsize,
}

#[derive(Debug, Default)]
struct LogProgressState {
    label: String,
    total: usize,
    next_report: usize,
}

impl LogProgress {
    pub fn new(step_percent: usize) -> Self {
        LogProgress {
            step_percent: step_percent.clamp(1, 100),
            state: Mutex::new(LogProgressState::default()),
            done: AtomicUsize::new(0),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        LogProgress::new(10)
    }
}

impl ProgressReporter for LogProgress {
    fn start(&self, label: &str, total: usize) {
        self.done.store(0, Ordering::SeqCst);
        if let Ok(mut state) = self.state.lock() {
            state.label = label.to_string();
            state.total = total;
            state.next_report = self.step_percent;
        }
        info!("{label}: starting ({total} units)");
    }

    fn advance(&self, units: usize) {
        let done = self.done.fetch_add(units, Ordering::SeqCst) + units;
        if let Ok(mut state) = self.state.lock() {
            if state.total == 0 {
                return;
            }
            let percent = done * 100 / state.total;
            if percent >= state.next_report {
                info!("{}: {}%", state.label, percent.min(100));
                while state.next_report <= percent {
                    state.next_report += self.step_percent;
                }
            }
        }
    }

    fn finish(&self) {
        if let Ok(state) = self.state.lock() {
            info!("{}: done", state.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_progress_counts_units() {
        let progress = LogProgress::new(25);
        progress.start("test", 8);
        for _ in 0..8 {
            progress.advance(1);
        }
        progress.finish();
        assert_eq!(progress.done.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn step_is_clamped() {
        assert_eq!(LogProgress::new(0).step_percent, 1);
        assert_eq!(LogProgress::new(500).step_percent, 100);
    }
}
