//! Core sync pipeline for jobs-supasync.
//!
//! One run is a single forward pass:
//! watermark -> delta fetch -> normalize -> batched write -> report.

use crate::batch::{BatchOutcome, BatchWriter};
use crate::config::{SyncBehaviorConfig, SyncConfig};
use crate::error::Result;
use crate::metrics::{Metrics, Timer};
use crate::postgres::PostgresClient;
use crate::record::normalize_all;
use crate::report::{SyncReport, SyncStatus};
use crate::store::{Destination, SourceStore};
use crate::supabase::SupabaseClient;
use crate::watermark::{SyncWindow, WatermarkOrigin, WatermarkResolver};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Write the delta to the destination
    #[default]
    Incremental,
    /// Fetch and normalize the delta, skip writes
    DryRun,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Incremental => write!(f, "incremental"),
            SyncMode::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Sync progress callback.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Sync progress update.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Current phase
    pub phase: SyncPhase,
    /// Records processed so far
    pub records_processed: usize,
    /// Total records to process (if known)
    pub total_records: Option<usize>,
    /// Percentage complete (0-100)
    pub percent: u8,
    /// Batch that just finished, during [`SyncPhase::Writing`]
    pub batch: Option<BatchOutcome>,
}

impl SyncProgress {
    fn phase(phase: SyncPhase, records_processed: usize, total_records: Option<usize>, percent: u8) -> Self {
        Self {
            phase,
            records_processed,
            total_records,
            percent,
            batch: None,
        }
    }
}

/// Sync phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Resolving the watermark
    Resolving,
    /// Fetching the delta from PostgreSQL
    Fetching,
    /// Normalizing rows
    Normalizing,
    /// Writing batches to the destination
    Writing,
    /// Completed
    Completed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Resolving => write!(f, "resolving"),
            SyncPhase::Fetching => write!(f, "fetching"),
            SyncPhase::Normalizing => write!(f, "normalizing"),
            SyncPhase::Writing => write!(f, "writing"),
            SyncPhase::Completed => write!(f, "completed"),
        }
    }
}

/// Main sync client.
///
/// Owns explicit handles to both stores; nothing is process-global.
pub struct SyncClient<S = PostgresClient, D = SupabaseClient> {
    settings: SyncBehaviorConfig,
    source: S,
    destination: D,
    resolver: WatermarkResolver,
    writer: BatchWriter,
    metrics: Arc<Metrics>,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl SyncClient {
    /// Connect to PostgreSQL and Supabase and create a sync client.
    #[instrument(skip(config))]
    pub async fn new(config: SyncConfig) -> Result<Self> {
        info!("Initializing sync client...");
        config.validate()?;

        let source = PostgresClient::connect(config.postgres.clone()).await?;
        let destination = SupabaseClient::connect(config.supabase.clone())?;

        Self::from_parts(config.sync, source, destination)
    }

    /// Test connectivity to both stores.
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity...");

        self.source.ping().await?;
        info!("PostgreSQL: OK");

        self.destination.ping().await?;
        info!("Supabase: OK");

        Ok(())
    }
}

impl<S: SourceStore, D: Destination> SyncClient<S, D> {
    /// Create a sync client from already-constructed stores.
    pub fn from_parts(settings: SyncBehaviorConfig, source: S, destination: D) -> Result<Self> {
        let resolver = WatermarkResolver::new(settings.watermark_advance()?);
        let writer = BatchWriter::new(settings.batch_size);

        Ok(Self {
            settings,
            source,
            destination,
            resolver,
            writer,
            metrics: Arc::new(Metrics::new()),
            progress_callback: None,
        })
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(SyncProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Share an existing metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics collected by this client.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Source store handle.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Destination store handle.
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Resolve the window for a run starting now.
    pub async fn resolve_window(&self) -> SyncWindow {
        let window = self.resolver.resolve(&self.destination, Utc::now()).await;
        if matches!(window.origin, WatermarkOrigin::Fallback { .. }) {
            self.metrics.record_watermark_fallback();
        }
        window
    }

    /// Resolve the window and count the rows a run would fetch.
    pub async fn pending(&self) -> Result<(SyncWindow, i64)> {
        let window = self.resolve_window().await;
        let count = self.source.count_delta(&window).await?;
        Ok((window, count))
    }

    /// Run one sync pass.
    ///
    /// Only configuration and delta-fetch errors are returned. Watermark
    /// errors fall back to a full resync and batch errors are recorded in
    /// the report.
    #[instrument(skip(self), fields(mode = %mode))]
    pub async fn sync(&self, mode: SyncMode) -> Result<SyncReport> {
        let start = Instant::now();
        let batch_size = self.writer.batch_size();

        info!("Starting {} sync...", mode);
        self.report_progress(SyncProgress::phase(SyncPhase::Resolving, 0, None, 0));

        let window = self.resolve_window().await;
        info!("Date range: {} to {}", window.low, window.high);

        self.report_progress(SyncProgress::phase(SyncPhase::Fetching, 0, None, 10));
        let timer = Timer::start("delta fetch");
        let records = self.source.fetch_delta(&window).await?;
        timer.stop();

        let fetched = records.len();
        self.metrics.record_fetch(fetched);
        info!("Fetched {} rows from PostgreSQL", fetched);

        if fetched == 0 {
            info!("No new jobs to sync");
            let report = SyncReport::new(SyncStatus::NoNewRecords, window, 0, 0, batch_size, vec![]);
            return Ok(self.finish(report, start));
        }

        self.report_progress(SyncProgress::phase(
            SyncPhase::Normalizing,
            0,
            Some(fetched),
            20,
        ));
        let prepared = normalize_all(
            records,
            &self.settings.country,
            self.settings.progress_interval,
        );
        self.metrics.record_prepared(prepared.len());
        info!("Total jobs prepared: {}", prepared.len());

        if mode == SyncMode::DryRun {
            info!(
                "Dry run: skipping insert of {} rows in {} batches",
                prepared.len(),
                self.writer.batch_count(prepared.len())
            );
            let report = SyncReport::new(
                SyncStatus::DryRun,
                window,
                fetched,
                prepared.len(),
                batch_size,
                vec![],
            );
            return Ok(self.finish(report, start));
        }

        let total = prepared.len();
        self.report_progress(SyncProgress::phase(SyncPhase::Writing, 0, Some(total), 25));

        let mut processed = 0;
        let batches = self
            .writer
            .write_all(&self.destination, &prepared, |outcome| {
                processed += outcome.attempted;
                self.metrics.record_batch(outcome);
                self.report_progress(SyncProgress {
                    phase: SyncPhase::Writing,
                    records_processed: processed,
                    total_records: Some(total),
                    percent: (25 + processed * 75 / total) as u8,
                    batch: Some(outcome.clone()),
                });
            })
            .await;

        let report = SyncReport::new(
            SyncStatus::Completed,
            window,
            fetched,
            total,
            batch_size,
            batches,
        );

        info!("Total rows inserted successfully: {}", report.rows_inserted);
        if report.rows_failed > 0 {
            warn!(
                "Total rows with errors: {} ({} failed batches)",
                report.rows_failed,
                report.failed_batches()
            );
        }
        if report.rows_unconfirmed > 0 {
            warn!(
                "Rows sent but not confirmed by the destination: {}",
                report.rows_unconfirmed
            );
        }
        if let Some(percent) = report.success_percent() {
            info!("Success rate: {:.2}%", percent);
        }

        Ok(self.finish(report, start))
    }

    fn finish(&self, report: SyncReport, start: Instant) -> SyncReport {
        let duration_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_run(duration_ms);

        self.report_progress(SyncProgress::phase(
            SyncPhase::Completed,
            report.rows_inserted,
            Some(report.records_prepared),
            100,
        ));
        info!("Sync {} in {}ms", report.status, duration_ms);

        report.with_duration(duration_ms)
    }

    /// Report progress via callback.
    fn report_progress(&self, progress: SyncProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(progress);
        }
    }
}
