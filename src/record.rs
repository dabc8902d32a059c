//! Source and target record types, and the normalizer between them.
//!
//! The destination table is semi-structured, so every column gets an
//! explicit absent-value policy instead of letting nulls leak through:
//!
//! | column kind | when absent |
//! |---|---|
//! | identifiers (`job_id`, `job_role_id`) | `null` |
//! | `job_role_name` | `null` |
//! | other text | `""` |
//! | `hours_back_posted` | `0` |
//! | `years_exp_required` | `null`, otherwise passed through as-is |
//! | timestamps | `null`, otherwise RFC 3339 text |
//! | `country` | always the configured constant |

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// A job posting joined to its classified role, as read from the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Posting id
    pub job_id: Option<i64>,
    /// Role id; absent when the role join found nothing
    pub job_role_id: Option<i64>,
    /// Role name
    pub job_role_name: Option<String>,
    /// Posting source (board, scraper)
    pub source: Option<String>,
    /// Posting title
    pub title: Option<String>,
    /// Hiring company
    pub company: Option<String>,
    /// Location text
    pub location: Option<String>,
    /// Posting URL
    pub url: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Raw scraped text
    pub raw_text: Option<String>,
    /// When the posting was published
    pub date_posted: Option<DateTime<Utc>>,
    /// Hours between publication and scrape
    pub hours_back_posted: Option<i64>,
    /// Required experience; text or number upstream
    pub years_exp_required: Option<JsonValue>,
    /// When the posting reached the source store; the sync cursor
    pub upload_date: Option<DateTime<Utc>>,
    /// When the posting was ingested
    pub ingested_at: Option<DateTime<Utc>>,
}

/// Canonical row written to the destination.
///
/// Every field is always serialized; absent values become explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Posting id
    pub job_id: Option<i64>,
    /// Role id
    pub job_role_id: Option<i64>,
    /// Role name
    pub job_role_name: Option<String>,
    /// Posting source
    pub source: String,
    /// Posting title
    pub title: String,
    /// Hiring company
    pub company: String,
    /// Location text
    pub location: String,
    /// Posting URL
    pub url: String,
    /// Description
    pub description: String,
    /// Raw scraped text
    pub raw_text: String,
    /// Publication time, RFC 3339
    pub date_posted: Option<String>,
    /// Hours between publication and scrape
    pub hours_back_posted: i64,
    /// Required experience, untouched
    pub years_exp_required: Option<JsonValue>,
    /// Upload time, RFC 3339
    pub upload_date: Option<String>,
    /// Ingestion time, RFC 3339
    pub ingested_at: Option<String>,
    /// Constant country
    pub country: String,
}

impl TargetRecord {
    /// Column names, in serialization order.
    pub const COLUMNS: [&'static str; 16] = [
        "job_id",
        "job_role_id",
        "job_role_name",
        "source",
        "title",
        "company",
        "location",
        "url",
        "description",
        "raw_text",
        "date_posted",
        "hours_back_posted",
        "years_exp_required",
        "upload_date",
        "ingested_at",
        "country",
    ];
}

/// Map one source row to its target row. Total: never fails.
pub fn normalize(record: SourceRecord, country: &str) -> TargetRecord {
    TargetRecord {
        job_id: record.job_id,
        job_role_id: record.job_role_id,
        job_role_name: record.job_role_name,
        source: record.source.unwrap_or_default(),
        title: record.title.unwrap_or_default(),
        company: record.company.unwrap_or_default(),
        location: record.location.unwrap_or_default(),
        url: record.url.unwrap_or_default(),
        description: record.description.unwrap_or_default(),
        raw_text: record.raw_text.unwrap_or_default(),
        date_posted: record.date_posted.map(format_timestamp),
        hours_back_posted: record.hours_back_posted.unwrap_or(0),
        years_exp_required: record.years_exp_required.filter(|v| !v.is_null()),
        upload_date: record.upload_date.map(format_timestamp),
        ingested_at: record.ingested_at.map(format_timestamp),
        country: country.to_string(),
    }
}

/// Normalize a whole delta, preserving order.
pub fn normalize_all(
    records: Vec<SourceRecord>,
    country: &str,
    progress_interval: usize,
) -> Vec<TargetRecord> {
    let total = records.len();
    let interval = progress_interval.max(1);

    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            let done = idx + 1;
            if done % interval == 0 || done == total {
                info!("Prepared {}/{} jobs for sync", done, total);
            }
            normalize(record, country)
        })
        .collect()
}

/// Canonical text form for timestamps: RFC 3339, fractional seconds only
/// when present, explicit `+00:00` offset.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}
