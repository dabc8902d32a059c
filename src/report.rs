//! Run summary: counts, per-batch outcomes and success rate.

use crate::batch::BatchOutcome;
use crate::watermark::SyncWindow;
use serde::Serialize;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Rows were written (possibly with failed batches).
    Completed,
    /// The delta was empty; nothing to do.
    NoNewRecords,
    /// Delta fetched and normalized, writes skipped.
    DryRun,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::NoNewRecords => write!(f, "no new records"),
            SyncStatus::DryRun => write!(f, "dry run"),
        }
    }
}

/// Machine-readable result of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Outcome
    pub status: SyncStatus,
    /// Window that was synced
    pub window: SyncWindow,
    /// Rows returned by the delta query
    pub records_fetched: usize,
    /// Rows normalized and handed to the writer
    pub records_prepared: usize,
    /// Batch size in effect
    pub batch_size: usize,
    /// Per-batch outcomes, in write order
    pub batches: Vec<BatchOutcome>,
    /// Rows sent across all batches
    pub rows_attempted: usize,
    /// Rows confirmed by the destination
    pub rows_inserted: usize,
    /// Rows in rejected batches
    pub rows_failed: usize,
    /// Rows in accepted batches the destination did not confirm
    pub rows_unconfirmed: usize,
    /// `rows_inserted / rows_attempted`, absent when nothing was attempted
    pub success_rate: Option<f64>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp when the run completed
    pub completed_at: String,
}

impl SyncReport {
    /// Build a report, aggregating the batch outcomes.
    pub fn new(
        status: SyncStatus,
        window: SyncWindow,
        records_fetched: usize,
        records_prepared: usize,
        batch_size: usize,
        batches: Vec<BatchOutcome>,
    ) -> Self {
        let rows_attempted = batches.iter().map(|b| b.attempted).sum();
        let rows_inserted = batches.iter().map(|b| b.inserted).sum();
        let rows_failed = batches.iter().map(BatchOutcome::failed).sum();
        let rows_unconfirmed = batches.iter().map(BatchOutcome::unconfirmed).sum();

        Self {
            status,
            window,
            records_fetched,
            records_prepared,
            batch_size,
            batches,
            rows_attempted,
            rows_inserted,
            rows_failed,
            rows_unconfirmed,
            success_rate: success_rate(rows_inserted, rows_attempted),
            duration_ms: 0,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Set the run duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Success rate as a percentage.
    pub fn success_percent(&self) -> Option<f64> {
        self.success_rate.map(|r| r * 100.0)
    }

    /// Number of batches the destination rejected.
    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| !b.succeeded()).count()
    }

    /// Whether every attempted row was confirmed.
    pub fn is_clean(&self) -> bool {
        self.rows_failed == 0 && self.rows_unconfirmed == 0
    }
}

fn success_rate(inserted: usize, attempted: usize) -> Option<f64> {
    (attempted > 0).then(|| inserted as f64 / attempted as f64)
}
