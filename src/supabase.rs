//! Supabase (PostgREST) client for jobs-supasync.

use crate::config::SupabaseConfig;
use crate::error::{Error, Result};
use crate::record::TargetRecord;
use crate::store::Destination;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};
use url::Url;

/// Supabase REST client wrapper.
pub struct SupabaseClient {
    http: reqwest::Client,
    endpoint: Url,
    config: SupabaseConfig,
}

#[derive(Debug, Deserialize)]
struct UploadDateRow {
    upload_date: Option<JsonValue>,
}

impl SupabaseClient {
    /// Build a client for the configured project and table.
    #[instrument(skip(config), fields(url = %config.url, table = %config.table))]
    pub fn connect(config: SupabaseConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| Error::config_with_source("Invalid Supabase URL", e))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(&format!("rest/v1/{}", config.table))
            .map_err(|e| Error::config_with_source("Invalid Supabase table name", e))?;

        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&config.key)
            .map_err(|e| Error::config_with_source("Supabase key is not a valid header", e))?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.key))
            .map_err(|e| Error::config_with_source("Supabase key is not a valid header", e))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::supabase_request(&config.table, "Failed to build HTTP client", e))?;

        info!("Supabase client ready");
        Ok(Self {
            http,
            endpoint,
            config,
        })
    }

    /// Destination table name.
    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Test connectivity and credentials against the destination table.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[("select", "upload_date"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::supabase_request(self.table(), "Ping failed", e))?;

        self.check_status(response).await?;
        Ok(())
    }

    /// Newest non-null `upload_date` in the destination table.
    #[instrument(skip(self), fields(table = %self.config.table))]
    pub async fn latest_upload_date(&self) -> Result<Option<String>> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("select", "upload_date"),
                ("upload_date", "not.is.null"),
                ("order", "upload_date.desc"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| Error::supabase_request(self.table(), "Max upload date query failed", e))?;

        let rows: Vec<UploadDateRow> = self
            .check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::supabase_request(self.table(), "Unexpected response body", e))?;

        match rows.into_iter().next().and_then(|row| row.upload_date) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::timestamp(
                other.to_string(),
                "upload_date is not a string",
            )),
        }
    }

    /// Insert one batch; returns the number of rows the server echoes back.
    #[instrument(skip(self, rows), fields(table = %self.config.table, count = rows.len()))]
    pub async fn insert_rows(&self, rows: &[TargetRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await
            .map_err(|e| Error::supabase_request(self.table(), "Bulk insert failed", e))?;

        let body = self
            .check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| Error::supabase_request(self.table(), "Failed to read response", e))?;

        let inserted = confirmed_rows(&body)?;
        debug!("Inserted {}/{} rows into {}", inserted, rows.len(), self.table());
        Ok(inserted)
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::supabase_response(self.table(), status.as_u16(), body))
    }
}

#[async_trait]
impl Destination for SupabaseClient {
    async fn latest_upload_date(&self) -> Result<Option<String>> {
        SupabaseClient::latest_upload_date(self).await
    }

    async fn insert_batch(&self, rows: &[TargetRecord]) -> Result<usize> {
        self.insert_rows(rows).await
    }
}

/// Count rows in a `return=representation` body. An empty body means the
/// server confirmed nothing.
fn confirmed_rows(body: &str) -> Result<usize> {
    if body.trim().is_empty() {
        return Ok(0);
    }
    let value: JsonValue = serde_json::from_str(body)
        .map_err(|e| Error::serialization("Insert response is not JSON", e))?;
    Ok(value.as_array().map_or(0, Vec::len))
}
