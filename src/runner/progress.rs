//! Background progress monitor for evaluation runs.
//!
//! Periodically logs run statistics (trials answered, failed, resumed) so
//! long eval runs can be followed without parsing per-trial log lines.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Snapshot of run counters at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Trials that produced an answer.
    pub answered: usize,
    /// Trials that errored or timed out.
    pub failed: usize,
    /// Trials skipped because an earlier run already answered them.
    pub skipped: usize,
    /// Wall-clock elapsed time since the monitor started.
    pub elapsed: Duration,
}

/// Shared atomic counters for run progress.
///
/// Cloned into worker tasks and incremented via `fetch_add`. The background
/// monitor reads these periodically to emit progress logs.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounters {
    /// Trials that produced an answer.
    pub answered: Arc<AtomicUsize>,
    /// Trials that errored or timed out.
    pub failed: Arc<AtomicUsize>,
    /// Trials skipped by resume.
    pub skipped: Arc<AtomicUsize>,
}

impl ProgressCounters {
    /// Create a new set of zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            answered: self.answered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs run progress.
///
/// Spawns a tokio task that wakes every `interval` and logs a summary of
/// the counters. Call [`ProgressMonitor::stop`] to cancel.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a background monitor that logs every `interval`.
    ///
    /// `total_trials` is the number of trials scheduled for this run, used
    /// for the progress percentage.
    pub fn start(counters: ProgressCounters, total_trials: usize, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let done = snap.answered + snap.failed;
                let pct = if total_trials > 0 {
                    (done as f64 / total_trials as f64 * 100.0).min(100.0)
                } else {
                    0.0
                };

                let elapsed_secs = snap.elapsed.as_secs_f64();
                let answered_per_sec = if elapsed_secs > 0.0 {
                    snap.answered as f64 / elapsed_secs
                } else {
                    0.0
                };

                tracing::info!(
                    answered = snap.answered,
                    failed = snap.failed,
                    skipped = snap.skipped,
                    total_trials = total_trials,
                    progress_pct = format!("{:.1}%", pct),
                    elapsed_secs = snap.elapsed.as_secs(),
                    answered_per_sec = format!("{:.2}", answered_per_sec),
                    "Eval progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Stop the monitor and wait for its task to finish.
    ///
    /// Aborts the in-flight tick wait, so stopping does not sit out the
    /// remainder of the logging interval.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}
