//! Destination store abstraction.

use crate::error::{SyncError, SyncResult};
use crate::sanitize::{canonical_id, parse_timestamp};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Column holding each row's extraction timestamp.
pub const EXTRACTED_AT_COLUMN: &str = "_extracted_at";

/// A relational store the engine reads watermarks from and upserts into.
///
/// This trait abstracts the destination, allowing different implementations
/// (PostgREST over HTTP, in-memory for testing, etc.).
pub trait DestinationStore: Send + Sync {
    /// Returns the most recent `_extracted_at` value of `table`, or `None`
    /// when the table is empty.
    fn latest_extraction(&self, table: &str) -> SyncResult<Option<String>>;

    /// Reads one page of the identifier column, ordered by that column.
    fn scan_ids(
        &self,
        table: &str,
        id_column: &str,
        offset: usize,
        limit: usize,
    ) -> SyncResult<Vec<Value>>;

    /// Inserts `rows`, replacing existing rows with the same `conflict_key`.
    fn upsert(&self, table: &str, conflict_key: &str, rows: Vec<Value>) -> SyncResult<()>;
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    /// Remaining failing upsert calls per table.
    upserts: HashMap<String, usize>,
    /// Tables whose upserts always fail.
    broken_tables: Vec<String>,
    reads: bool,
}

/// An in-memory destination for testing.
///
/// Rows are keyed by their conflict-key value, so upserting the same key
/// twice merges into one row.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    failures: RwLock<FailurePlan>,
    upsert_log: RwLock<Vec<(String, usize)>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, bypassing failure injection and the call log.
    pub fn seed(&self, table: &str, conflict_key: &str, rows: Vec<Value>) {
        let mut tables = self.tables.write();
        let target = tables.entry(table.to_string()).or_default();
        for row in rows {
            Self::merge_row(target, conflict_key, row);
        }
    }

    /// Makes the next `calls` upserts into `table` fail.
    pub fn fail_next_upserts(&self, table: &str, calls: usize) {
        self.failures.write().upserts.insert(table.to_string(), calls);
    }

    /// Makes every upsert into `table` fail.
    pub fn break_table(&self, table: &str) {
        self.failures.write().broken_tables.push(table.to_string());
    }

    /// Makes every read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.failures.write().reads = fail;
    }

    /// Returns all rows of `table` ordered by key.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the row of `table` with key `id`.
    pub fn row(&self, table: &str, id: &str) -> Option<Value> {
        self.tables
            .read()
            .get(table)
            .and_then(|t| t.rows.get(id).cloned())
    }

    /// Returns the number of rows in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    /// Returns `(table, row count)` for every upsert call, in call order.
    pub fn upsert_calls(&self) -> Vec<(String, usize)> {
        self.upsert_log.read().clone()
    }

    /// Returns the sizes of the upsert calls made against `table`.
    pub fn upsert_sizes(&self, table: &str) -> Vec<usize> {
        self.upsert_log
            .read()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }

    fn merge_row(table: &mut MemoryTable, conflict_key: &str, row: Value) -> bool {
        let Some(key) = row.get(conflict_key).and_then(canonical_id) else {
            return false;
        };
        match table.rows.get_mut(&key) {
            Some(Value::Object(existing)) if row.is_object() => {
                if let Value::Object(incoming) = row {
                    existing.extend(incoming);
                }
            }
            _ => {
                table.rows.insert(key, row);
            }
        }
        true
    }

    fn check_reads(&self) -> SyncResult<()> {
        if self.failures.read().reads {
            return Err(SyncError::Destination("injected read failure".into()));
        }
        Ok(())
    }

    fn take_upsert_failure(&self, table: &str) -> bool {
        let mut failures = self.failures.write();
        if failures.broken_tables.iter().any(|t| t == table) {
            return true;
        }
        match failures.upserts.get_mut(table) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl DestinationStore for MemoryStore {
    fn latest_extraction(&self, table: &str) -> SyncResult<Option<String>> {
        self.check_reads()?;
        let tables = self.tables.read();
        let Some(target) = tables.get(table) else {
            return Ok(None);
        };
        let latest = target
            .rows
            .values()
            .filter_map(|row| row.get(EXTRACTED_AT_COLUMN)?.as_str())
            .filter_map(|raw| parse_timestamp(raw).map(|ts| (ts, raw)))
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, raw)| raw.to_string());
        Ok(latest)
    }

    fn scan_ids(
        &self,
        table: &str,
        id_column: &str,
        offset: usize,
        limit: usize,
    ) -> SyncResult<Vec<Value>> {
        self.check_reads()?;
        let tables = self.tables.read();
        let Some(target) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(target
            .rows
            .values()
            .skip(offset)
            .take(limit)
            .map(|row| row.get(id_column).cloned().unwrap_or(Value::Null))
            .collect())
    }

    fn upsert(&self, table: &str, conflict_key: &str, rows: Vec<Value>) -> SyncResult<()> {
        self.upsert_log.write().push((table.to_string(), rows.len()));
        if self.take_upsert_failure(table) {
            return Err(SyncError::Destination(format!(
                "injected upsert failure on {table}"
            )));
        }
        let mut tables = self.tables.write();
        let target = tables.entry(table.to_string()).or_default();
        let missing = rows
            .into_iter()
            .map(|row| Self::merge_row(target, conflict_key, row))
            .filter(|merged| !merged)
            .count();
        if missing > 0 {
            return Err(SyncError::Destination(format!(
                "{missing} rows without {conflict_key}"
            )));
        }
        Ok(())
    }
}
