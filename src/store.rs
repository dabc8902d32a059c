//! Collaborator seams between the sync pipeline and the two stores.
//!
//! The pipeline is generic over these traits. [`PostgresClient`] and
//! [`SupabaseClient`] are the production implementations; tests drive the
//! pipeline with in-memory ones.
//!
//! [`PostgresClient`]: crate::postgres::PostgresClient
//! [`SupabaseClient`]: crate::supabase::SupabaseClient

use crate::error::Result;
use crate::record::{SourceRecord, TargetRecord};
use crate::watermark::SyncWindow;
use async_trait::async_trait;

/// Read side: the relational source of truth.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Every record with `upload_date` strictly after `window.low` and at or
    /// before the store's own clock at execution time, newest first.
    async fn fetch_delta(&self, window: &SyncWindow) -> Result<Vec<SourceRecord>>;

    /// Number of records [`fetch_delta`](Self::fetch_delta) would return.
    async fn count_delta(&self, window: &SyncWindow) -> Result<i64>;
}

/// Read/write side: the downstream store.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Maximum non-null `upload_date` already written, in the destination's
    /// native text representation. `None` when nothing has been synced.
    async fn latest_upload_date(&self) -> Result<Option<String>>;

    /// Insert one batch, returning how many rows the destination confirms.
    async fn insert_batch(&self, rows: &[TargetRecord]) -> Result<usize>;
}
