//! PostgREST destination over an [`HttpClient`].

use crate::destination::{DestinationStore, EXTRACTED_AT_COLUMN};
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest};
use serde_json::{Map, Value};
use tracing::debug;

const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

/// A destination reached through a PostgREST endpoint, such as Supabase.
///
/// Every call carries the service key both as `apikey` and as a bearer token.
pub struct PostgrestStore<C: HttpClient> {
    base_url: String,
    key: String,
    client: C,
}

impl<C: HttpClient> PostgrestStore<C> {
    /// Creates a store rooted at `base_url` (the project URL, without `/rest/v1`).
    pub fn new(base_url: impl Into<String>, key: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            client,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .with_header("apikey", self.key.clone())
            .with_bearer(&self.key)
    }

    fn select(&self, table: &str, request: HttpRequest) -> SyncResult<Vec<Map<String, Value>>> {
        let response = self
            .client
            .send(self.authorized(request))
            .map_err(|e| destination_error(table, e))?
            .error_for_status()
            .map_err(|e| destination_error(table, e))?;
        response.decode()
    }
}

fn destination_error(table: &str, err: SyncError) -> SyncError {
    match err {
        SyncError::Status { status, body } => {
            SyncError::Destination(format!("{table}: status {status}: {body}"))
        }
        other => other,
    }
}

impl<C: HttpClient> DestinationStore for PostgrestStore<C> {
    fn latest_extraction(&self, table: &str) -> SyncResult<Option<String>> {
        let request = HttpRequest::get(self.table_url(table))
            .with_query("select", EXTRACTED_AT_COLUMN)
            .with_query("order", format!("{EXTRACTED_AT_COLUMN}.desc"))
            .with_query("limit", "1");
        let rows = self.select(table, request)?;
        Ok(rows
            .first()
            .and_then(|row| row.get(EXTRACTED_AT_COLUMN))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn scan_ids(
        &self,
        table: &str,
        id_column: &str,
        offset: usize,
        limit: usize,
    ) -> SyncResult<Vec<Value>> {
        let request = HttpRequest::get(self.table_url(table))
            .with_query("select", id_column)
            .with_query("order", format!("{id_column}.asc"))
            .with_query("offset", offset.to_string())
            .with_query("limit", limit.to_string());
        let rows = self.select(table, request)?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(id_column).unwrap_or(Value::Null))
            .collect())
    }

    fn upsert(&self, table: &str, conflict_key: &str, rows: Vec<Value>) -> SyncResult<()> {
        debug!(%table, rows = rows.len(), "upserting batch");
        let request = HttpRequest::post_json(self.table_url(table), &rows)?
            .with_query("on_conflict", conflict_key)
            .with_header("Prefer", UPSERT_PREFERENCE);
        self.client
            .send(self.authorized(request))
            .map_err(|e| destination_error(table, e))?
            .error_for_status()
            .map_err(|e| destination_error(table, e))?;
        Ok(())
    }
}
