// Initialisation metrics
//
// Lightweight counters for what initialisation runs did, logged on shutdown.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every initialisation run in the process
///
/// Uses atomic operations so the task and the shutdown path can touch them without locks.
#[derive(Debug)]
pub struct Metrics {
    runs_started: AtomicUsize,
    runs_completed: AtomicUsize,
    validation_failures: AtomicUsize,
    runs_cancelled: AtomicUsize,

    /// Decompiled mods removed because they had no cache entry
    mods_pruned: AtomicUsize,

    /// Cumulative wall time of successful decompiler checks
    validation_time_ms: AtomicU64,

    start_time: Instant,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub runs_started: usize,
    pub runs_completed: usize,
    pub validation_failures: usize,
    pub runs_cancelled: usize,
    pub mods_pruned: usize,
    pub validation_time_ms: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicUsize::new(0),
            runs_completed: AtomicUsize::new(0),
            validation_failures: AtomicUsize::new(0),
            runs_cancelled: AtomicUsize::new(0),
            mods_pruned: AtomicUsize::new(0),
            validation_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failed(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mods_pruned(&self, count: usize) {
        self.mods_pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_validation_time(&self, duration: Duration) {
        self.validation_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            mods_pruned: self.mods_pruned.load(Ordering::Relaxed),
            validation_time_ms: self.validation_time_ms.load(Ordering::Relaxed),
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        tracing::info!("=== Initialisation Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} started, {} completed, {} failed decompiler check, {} cancelled",
            snapshot.runs_started,
            snapshot.runs_completed,
            snapshot.validation_failures,
            snapshot.runs_cancelled
        );
        tracing::info!(
            "Pruned {} uncached mods, decompiler checks took {:.2}s",
            snapshot.mods_pruned,
            snapshot.validation_time_ms as f64 / 1000.0
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
