//! Best-effort batched writes with per-batch accounting.

use crate::record::TargetRecord;
use crate::store::Destination;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Outcome of one batch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// 1-based batch number
    pub index: usize,
    /// Rows sent
    pub attempted: usize,
    /// Rows the destination confirmed
    pub inserted: usize,
    /// Error message when the destination rejected the batch
    pub error: Option<String>,
}

impl BatchOutcome {
    /// Whether the write call itself succeeded.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Rows lost to a rejected batch.
    pub fn failed(&self) -> usize {
        if self.succeeded() { 0 } else { self.attempted }
    }

    /// Rows sent in an accepted batch that the destination did not confirm.
    pub fn unconfirmed(&self) -> usize {
        if self.succeeded() {
            self.attempted.saturating_sub(self.inserted)
        } else {
            0
        }
    }
}

/// Splits records into fixed-size batches and writes them one at a time.
///
/// A failed batch never stops the run: its rows are counted as failed and
/// the next batch is attempted. There are no retries.
#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    batch_size: usize,
}

impl BatchWriter {
    /// Create a writer. A zero batch size is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `len` records will be split into.
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size)
    }

    /// Write all records in order, calling `on_batch` after each batch.
    #[instrument(skip_all, fields(rows = records.len(), batch_size = self.batch_size))]
    pub async fn write_all<D, F>(
        &self,
        destination: &D,
        records: &[TargetRecord],
        mut on_batch: F,
    ) -> Vec<BatchOutcome>
    where
        D: Destination + ?Sized,
        F: FnMut(&BatchOutcome),
    {
        info!(
            "Inserting {} jobs using batch size {}",
            records.len(),
            self.batch_size
        );

        let mut outcomes = Vec::with_capacity(self.batch_count(records.len()));

        for (i, chunk) in records.chunks(self.batch_size).enumerate() {
            let index = i + 1;
            let outcome = match destination.insert_batch(chunk).await {
                Ok(inserted) => {
                    info!("Batch {}: inserted {}/{} rows", index, inserted, chunk.len());
                    BatchOutcome {
                        index,
                        attempted: chunk.len(),
                        inserted,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(code = e.code(), "Batch {}: error - {}", index, e);
                    BatchOutcome {
                        index,
                        attempted: chunk.len(),
                        inserted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };

            on_batch(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(1000)
    }
}
