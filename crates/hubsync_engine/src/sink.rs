//! Streaming batch upserts.

use crate::destination::DestinationStore;
use crate::report::TableReport;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Upserts a row stream in fixed-size batches.
///
/// At most one batch is held in memory. A rejected batch counts every row
/// in it as an error and the stream carries on with the next batch.
pub struct StreamingUpsertSink<'a> {
    store: &'a dyn DestinationStore,
    batch_size: usize,
}

impl<'a> StreamingUpsertSink<'a> {
    /// Creates a sink writing `batch_size` rows per upsert.
    pub fn new(store: &'a dyn DestinationStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Batch size in rows.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drains `rows` into `table`, resolving conflicts on `conflict_key`.
    pub fn drain<I>(&self, table: &str, rows: I, conflict_key: &str) -> TableReport
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let mut report = TableReport::new(table);
        let mut batch = Vec::with_capacity(self.batch_size);

        for row in rows {
            report.total += 1;
            match serde_json::to_value(&row) {
                Ok(value) => batch.push(value),
                Err(err) => {
                    report.error += 1;
                    warn!(%table, error = %err, "row could not be serialized");
                }
            }
            if batch.len() >= self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.flush(table, conflict_key, full, &mut report);
            }
        }
        if !batch.is_empty() {
            self.flush(table, conflict_key, batch, &mut report);
        }

        if report.is_empty() {
            info!(%table, "no records");
        } else {
            info!(%table, total = report.total, success = report.success, error = report.error, "table loaded");
        }
        report
    }

    fn flush(&self, table: &str, conflict_key: &str, batch: Vec<Value>, report: &mut TableReport) {
        let rows = batch.len() as u64;
        match self.store.upsert(table, conflict_key, batch) {
            Ok(()) => {
                report.success += rows;
                debug!(%table, rows, loaded = report.success, "batch upserted");
            }
            Err(err) => {
                report.error += rows;
                warn!(%table, rows, error = %err, "batch upsert failed");
            }
        }
    }
}
