//! End-to-end runs of the sync pipeline against in-memory stores.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jobs_supasync::config::SyncBehaviorConfig;
use jobs_supasync::watermark::{EPOCH, parse_timestamp};
use jobs_supasync::{
    Destination, Error, Result, SourceRecord, SourceStore, SyncClient, SyncMode, SyncPhase,
    SyncStatus, SyncWindow, TargetRecord, WatermarkOrigin,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Source table held in memory; applies the same predicate and ordering as
/// the PostgreSQL delta query.
struct MemorySource {
    rows: Vec<SourceRecord>,
    fail: bool,
    queried_low: Mutex<Vec<DateTime<Utc>>>,
}

impl MemorySource {
    fn new(rows: Vec<SourceRecord>) -> Self {
        Self {
            rows,
            fail: false,
            queried_low: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    fn delta(&self, window: &SyncWindow) -> Vec<SourceRecord> {
        let now = Utc::now();
        let mut rows: Vec<SourceRecord> = self
            .rows
            .iter()
            .filter(|r| r.upload_date.is_some_and(|ts| ts > window.low && ts <= now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        rows
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn fetch_delta(&self, window: &SyncWindow) -> Result<Vec<SourceRecord>> {
        self.queried_low.lock().unwrap().push(window.low);
        if self.fail {
            return Err(Error::validation("relation \"karmafy_job\" does not exist"));
        }
        Ok(self.delta(window))
    }

    async fn count_delta(&self, window: &SyncWindow) -> Result<i64> {
        Ok(self.delta(window).len() as i64)
    }
}

/// Destination table held in memory.
#[derive(Default)]
struct MemoryDestination {
    rows: Mutex<Vec<TargetRecord>>,
    calls: Mutex<usize>,
    fail_batches: HashSet<usize>,
    fail_watermark: bool,
}

impl MemoryDestination {
    fn seeded(upload_dates: &[&str]) -> Self {
        let rows = upload_dates
            .iter()
            .map(|d| TargetRecord {
                upload_date: Some(d.to_string()),
                ..jobs_supasync::normalize(SourceRecord::default(), "United States of America")
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn job_ids(&self) -> Vec<Option<i64>> {
        self.rows.lock().unwrap().iter().map(|r| r.job_id).collect()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn latest_upload_date(&self) -> Result<Option<String>> {
        if self.fail_watermark {
            return Err(Error::supabase_response("job_jobrole_all", 503, "unavailable"));
        }
        let rows = self.rows.lock().unwrap();
        let latest = rows
            .iter()
            .filter_map(|r| r.upload_date.as_deref())
            .max_by_key(|raw| parse_timestamp(raw).ok())
            .map(str::to_string);
        Ok(latest)
    }

    async fn insert_batch(&self, rows: &[TargetRecord]) -> Result<usize> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_batches.contains(&call) {
            return Err(Error::supabase_response("job_jobrole_all", 500, "batch rejected"));
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len())
    }
}

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn job(id: i64, uploaded: DateTime<Utc>) -> SourceRecord {
    SourceRecord {
        job_id: Some(id),
        job_role_id: Some(3),
        job_role_name: Some("Analyst".into()),
        title: Some(format!("Job {id}")),
        upload_date: Some(uploaded),
        ..Default::default()
    }
}

fn settings(batch_size: usize) -> SyncBehaviorConfig {
    SyncBehaviorConfig {
        batch_size,
        ..Default::default()
    }
}

fn client(
    batch_size: usize,
    source: MemorySource,
    dest: MemoryDestination,
) -> SyncClient<MemorySource, MemoryDestination> {
    SyncClient::from_parts(settings(batch_size), source, dest).unwrap()
}

#[tokio::test]
async fn delta_starts_at_destination_max() {
    let source = MemorySource::new(vec![
        job(1, utc(2024, 1, 2, 0)),
        job(2, utc(2024, 1, 3, 0)),
        job(3, utc(2023, 12, 31, 0)),
    ]);
    let dest = MemoryDestination::seeded(&["2024-01-01T00:00:00"]);
    let client = client(1000, source, dest);

    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.window.low, utc(2024, 1, 1, 0));
    assert_eq!(report.records_fetched, 2);
    assert_eq!(report.rows_inserted, 2);
    // newest first, seeded row first
    assert_eq!(client.destination().job_ids(), vec![None, Some(2), Some(1)]);
    assert_eq!(
        client.source().queried_low.lock().unwrap().as_slice(),
        &[utc(2024, 1, 1, 0)]
    );
}

#[tokio::test]
async fn row_equal_to_destination_max_is_not_refetched() {
    let source = MemorySource::new(vec![job(1, utc(2024, 1, 1, 0)), job(2, utc(2024, 1, 3, 0))]);
    let dest = MemoryDestination::seeded(&["2024-01-01 00:00:00+00"]);
    let client = client(1000, source, dest);

    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.records_fetched, 1);
    assert_eq!(client.destination().job_ids(), vec![None, Some(2)]);
}

#[tokio::test]
async fn configured_advance_skips_the_overlap_window() {
    let source = MemorySource::new(vec![
        job(1, utc(2024, 1, 2, 0)),
        job(2, utc(2024, 1, 3, 0)),
    ]);
    let dest = MemoryDestination::seeded(&["2024-01-01T00:00:00"]);
    let behavior = SyncBehaviorConfig {
        watermark_advance: "1day".into(),
        ..settings(1000)
    };
    let client = SyncClient::from_parts(behavior, source, dest).unwrap();

    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.window.low, utc(2024, 1, 2, 0));
    assert_eq!(client.destination().job_ids(), vec![None, Some(2)]);
}

#[tokio::test]
async fn empty_destination_syncs_everything() {
    let source = MemorySource::new((1..=5).map(|i| job(i, utc(2024, 2, i as u32, 0))).collect());
    let client = client(2, source, MemoryDestination::default());

    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.window.low, EPOCH);
    assert_eq!(report.window.origin, WatermarkOrigin::EmptyDestination);
    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.batches.len(), 3);
    assert_eq!(report.rows_inserted, 5);
    assert_eq!(report.success_rate, Some(1.0));
    assert_eq!(
        client.destination().job_ids(),
        vec![Some(5), Some(4), Some(3), Some(2), Some(1)]
    );
}

#[tokio::test]
async fn second_run_inserts_nothing() {
    let source = MemorySource::new((1..=4).map(|i| job(i, utc(2024, 3, i as u32, 12))).collect());
    let client = client(3, source, MemoryDestination::default());

    let first = client.sync(SyncMode::Incremental).await.unwrap();
    assert_eq!(first.rows_inserted, 4);

    let second = client.sync(SyncMode::Incremental).await.unwrap();
    assert_eq!(second.status, SyncStatus::NoNewRecords);
    assert_eq!(second.rows_inserted, 0);
    assert_eq!(second.success_rate, None);
    assert_eq!(second.window.low, utc(2024, 3, 4, 12));
    assert_eq!(client.destination().len(), 4);
}

#[tokio::test]
async fn failed_batch_does_not_stop_later_batches() {
    let source = MemorySource::new((1..=7).map(|i| job(i, utc(2024, 4, i as u32, 0))).collect());
    let dest = MemoryDestination {
        fail_batches: HashSet::from([2]),
        ..Default::default()
    };
    let client = client(3, source, dest);

    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.batches.len(), 3);
    assert!(report.batches[0].succeeded());
    assert!(!report.batches[1].succeeded());
    assert!(report.batches[2].succeeded());
    assert_eq!(report.rows_attempted, 7);
    assert_eq!(report.rows_inserted, 4);
    assert_eq!(report.rows_failed, 3);
    assert_eq!(client.destination().len(), 4);

    let snapshot = client.metrics().snapshot();
    assert_eq!(snapshot.batches_total, 3);
    assert_eq!(snapshot.batches_failed, 1);
}

#[tokio::test]
async fn watermark_error_falls_back_to_full_resync() {
    let source = MemorySource::new(vec![job(1, utc(2020, 1, 1, 0))]);
    let dest = MemoryDestination {
        fail_watermark: true,
        ..Default::default()
    };
    let client = client(1000, source, dest);

    let before = Utc::now();
    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.window.low, EPOCH);
    assert!(report.window.high >= before);
    assert!(matches!(report.window.origin, WatermarkOrigin::Fallback { .. }));
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(client.metrics().snapshot().watermark_fallbacks, 1);
}

#[tokio::test]
async fn fetch_error_aborts_the_run() {
    let client = client(1000, MemorySource::failing(), MemoryDestination::default());

    let err = client.sync(SyncMode::Incremental).await.unwrap_err();

    assert!(err.to_string().contains("karmafy_job"));
    assert_eq!(client.destination().len(), 0);
    assert_eq!(*client.destination().calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn future_rows_wait_for_a_later_run() {
    let future = Utc::now() + chrono::TimeDelta::days(30);
    let source = MemorySource::new(vec![job(1, future), job(2, utc(2024, 5, 1, 0))]);
    let client = client(1000, source, MemoryDestination::default());

    let report = client.sync(SyncMode::Incremental).await.unwrap();

    assert_eq!(report.records_fetched, 1);
    assert_eq!(client.destination().job_ids(), vec![Some(2)]);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let source = MemorySource::new((1..=3).map(|i| job(i, utc(2024, 6, i as u32, 0))).collect());
    let client = client(1000, source, MemoryDestination::default());

    let report = client.sync(SyncMode::DryRun).await.unwrap();

    assert_eq!(report.status, SyncStatus::DryRun);
    assert_eq!(report.records_prepared, 3);
    assert!(report.batches.is_empty());
    assert_eq!(client.destination().len(), 0);
}

#[tokio::test]
async fn failed_role_join_normalizes_to_explicit_nulls() {
    let orphan = SourceRecord {
        job_id: Some(9),
        job_role_id: None,
        job_role_name: None,
        years_exp_required: None,
        hours_back_posted: None,
        upload_date: Some(utc(2024, 7, 1, 0)),
        ..Default::default()
    };
    let client = client(1000, MemorySource::new(vec![orphan]), MemoryDestination::default());

    client.sync(SyncMode::Incremental).await.unwrap();

    let rows = client.destination().rows.lock().unwrap().clone();
    let row = serde_json::to_value(&rows[0]).unwrap();
    assert_eq!(row["job_id"], json!(9));
    assert_eq!(row["job_role_id"], json!(null));
    assert_eq!(row["job_role_name"], json!(null));
    assert_eq!(row["years_exp_required"], json!(null));
    assert_eq!(row["hours_back_posted"], json!(0));
    assert_eq!(row["title"], json!(""));
    assert_eq!(row["upload_date"], json!("2024-07-01T00:00:00+00:00"));
    assert_eq!(row["country"], json!("United States of America"));
}

#[tokio::test]
async fn pending_counts_the_delta() {
    let source = MemorySource::new(vec![job(1, utc(2024, 1, 5, 0)), job(2, utc(2024, 1, 1, 0))]);
    let dest = MemoryDestination::seeded(&["2024-01-02T00:00:00Z"]);
    let client = client(1000, source, dest);

    let (window, pending) = client.pending().await.unwrap();

    assert_eq!(window.low, utc(2024, 1, 2, 0));
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn progress_reports_each_batch() {
    let source = MemorySource::new((1..=5).map(|i| job(i, utc(2024, 8, i as u32, 0))).collect());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let client = client(2, source, MemoryDestination::default()).with_progress(move |p| {
        sink.lock().unwrap().push((p.phase, p.batch.map(|b| b.index), p.percent));
    });
    client.sync(SyncMode::Incremental).await.unwrap();

    let seen = seen.lock().unwrap();
    let batch_indexes: Vec<usize> = seen.iter().filter_map(|(_, b, _)| *b).collect();
    assert_eq!(batch_indexes, vec![1, 2, 3]);
    assert_eq!(seen.first().map(|s| s.0), Some(SyncPhase::Resolving));
    assert_eq!(seen.last().map(|s| (s.0, s.2)), Some((SyncPhase::Completed, 100)));
}
