//! Watermark resolution: where the previous run stopped.
//!
//! The watermark is never stored by this crate. It is re-derived at the
//! start of every run from the newest `upload_date` already present in the
//! destination, then turned into a half-open window `(low, high]` for the
//! delta query.

use crate::error::{Error, Result};
use crate::store::Destination;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Lower bound used when nothing is known about previous runs.
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Where the low bound of a [`SyncWindow`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatermarkOrigin {
    /// Destination holds no row with an upload date.
    EmptyDestination,
    /// Derived from the destination's newest upload date.
    Destination {
        /// Newest upload date in the destination, normalized to UTC
        max_upload_date: DateTime<Utc>,
    },
    /// Resolution failed; fell back to a full resync.
    Fallback {
        /// Why resolution failed
        reason: String,
    },
}

/// Half-open interval `(low, high]` of upload dates to sync.
///
/// `high` is the wall-clock time at run start and is informational: the
/// delta query evaluates its own upper bound at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    /// Exclusive lower bound
    pub low: DateTime<Utc>,
    /// Inclusive upper bound at run start
    pub high: DateTime<Utc>,
    /// Provenance of `low`
    pub origin: WatermarkOrigin,
}

impl SyncWindow {
    /// Window covering everything up to `now`.
    pub fn full(now: DateTime<Utc>, origin: WatermarkOrigin) -> Self {
        Self {
            low: EPOCH,
            high: now,
            origin,
        }
    }

    /// Whether this window resyncs from the epoch.
    pub fn is_full_resync(&self) -> bool {
        self.low == EPOCH
    }
}

/// Resolves the sync window from the destination's current contents.
#[derive(Debug, Clone)]
pub struct WatermarkResolver {
    advance: TimeDelta,
}

impl WatermarkResolver {
    /// Create a resolver that starts the window `advance` past the
    /// destination's newest upload date.
    pub fn new(advance: Duration) -> Self {
        Self {
            advance: TimeDelta::from_std(advance).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Resolve the window. Never fails: any error falls back to a full
    /// resync from [`EPOCH`].
    #[instrument(skip(self, destination))]
    pub async fn resolve<D>(&self, destination: &D, now: DateTime<Utc>) -> SyncWindow
    where
        D: Destination + ?Sized,
    {
        match self.try_resolve(destination).await {
            Ok(None) => {
                info!("No existing data found, starting fresh sync from the beginning");
                SyncWindow::full(now, WatermarkOrigin::EmptyDestination)
            }
            Ok(Some((max, low))) => {
                info!("Max upload date: {}", max);
                SyncWindow {
                    low,
                    high: now,
                    origin: WatermarkOrigin::Destination {
                        max_upload_date: max,
                    },
                }
            }
            Err(e) => {
                warn!(code = e.code(), "Error fetching max upload date: {}", e);
                SyncWindow::full(
                    now,
                    WatermarkOrigin::Fallback {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn try_resolve<D>(&self, destination: &D) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>>
    where
        D: Destination + ?Sized,
    {
        let Some(raw) = destination.latest_upload_date().await? else {
            return Ok(None);
        };

        let max = parse_timestamp(&raw)?;
        let low = max
            .checked_add_signed(self.advance)
            .ok_or_else(|| Error::timestamp(&raw, "advancing the watermark overflows"))?;

        Ok(Some((max, low)))
    }
}

impl Default for WatermarkResolver {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// Parse a timestamp as the destination renders it.
///
/// Accepts RFC 3339, PostgreSQL's text form (space separator, `+00` style
/// offsets), either of those without an offset (taken as UTC), and bare
/// dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(value, fmt) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(ts.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts.and_utc());
        }
    }

    Err(Error::timestamp(raw, "unrecognized timestamp format"))
}
