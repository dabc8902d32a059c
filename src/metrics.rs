//! Metrics and observability for jobs-supasync.
//!
//! Counters are kept in-process (see [`Metrics::snapshot`]) and mirrored to
//! the `metrics` facade, so an installed recorder picks them up.

use crate::batch::BatchOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for sync runs.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Runs finished
    pub runs_total: AtomicU64,
    /// Runs whose watermark fell back to a full resync
    pub watermark_fallbacks: AtomicU64,
    /// Rows returned by delta queries
    pub records_fetched: AtomicU64,
    /// Rows normalized
    pub records_prepared: AtomicU64,
    /// Batches attempted
    pub batches_total: AtomicU64,
    /// Batches rejected
    pub batches_failed: AtomicU64,
    /// Rows confirmed by the destination
    pub rows_inserted: AtomicU64,
    /// Rows in rejected batches
    pub rows_failed: AtomicU64,
    /// Total run duration in milliseconds
    pub run_duration_ms: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a watermark fallback.
    pub fn record_watermark_fallback(&self) {
        self.watermark_fallbacks.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("jobsync_watermark_fallbacks_total").increment(1);
    }

    /// Record a delta fetch.
    pub fn record_fetch(&self, rows: usize) {
        self.records_fetched.fetch_add(rows as u64, Ordering::Relaxed);
        ::metrics::counter!("jobsync_records_fetched_total").increment(rows as u64);
    }

    /// Record normalized rows.
    pub fn record_prepared(&self, rows: usize) {
        self.records_prepared
            .fetch_add(rows as u64, Ordering::Relaxed);
        ::metrics::counter!("jobsync_records_prepared_total").increment(rows as u64);
    }

    /// Record one batch outcome.
    pub fn record_batch(&self, outcome: &BatchOutcome) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted
            .fetch_add(outcome.inserted as u64, Ordering::Relaxed);
        ::metrics::counter!("jobsync_batches_total").increment(1);
        ::metrics::counter!("jobsync_rows_inserted_total").increment(outcome.inserted as u64);

        if !outcome.succeeded() {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
            self.rows_failed
                .fetch_add(outcome.failed() as u64, Ordering::Relaxed);
            ::metrics::counter!("jobsync_batches_failed_total").increment(1);
            ::metrics::counter!("jobsync_rows_failed_total").increment(outcome.failed() as u64);
        }
    }

    /// Record a finished run.
    pub fn record_run(&self, duration_ms: u64) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.run_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        ::metrics::counter!("jobsync_runs_total").increment(1);
        ::metrics::histogram!("jobsync_run_duration_ms").record(duration_ms as f64);
    }

    /// Get snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            watermark_fallbacks: self.watermark_fallbacks.load(Ordering::Relaxed),
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            records_prepared: self.records_prepared.load(Ordering::Relaxed),
            batches_total: self.batches_total.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            run_duration_ms: self.run_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs finished
    pub runs_total: u64,
    /// Watermark fallbacks
    pub watermark_fallbacks: u64,
    /// Rows fetched
    pub records_fetched: u64,
    /// Rows normalized
    pub records_prepared: u64,
    /// Batches attempted
    pub batches_total: u64,
    /// Batches rejected
    pub batches_failed: u64,
    /// Rows confirmed
    pub rows_inserted: u64,
    /// Rows in rejected batches
    pub rows_failed: u64,
    /// Total run duration in milliseconds
    pub run_duration_ms: u64,
}

impl MetricsSnapshot {
    /// Fraction of batches accepted by the destination.
    pub fn batch_success_rate(&self) -> f64 {
        if self.batches_total == 0 {
            0.0
        } else {
            (self.batches_total - self.batches_failed) as f64 / self.batches_total as f64
        }
    }

    /// Rows confirmed per second of run time.
    pub fn rows_per_second(&self) -> f64 {
        if self.run_duration_ms == 0 {
            0.0
        } else {
            (self.rows_inserted as f64 * 1000.0) / self.run_duration_ms as f64
        }
    }
}

/// Timer for measuring phase duration.
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}ms", self.label, elapsed);
        elapsed
    }
}
