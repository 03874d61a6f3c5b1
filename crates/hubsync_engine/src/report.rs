//! Per-table and per-run outcome reports.

use crate::error::SyncError;
use crate::mode::SyncMode;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use uuid::Uuid;

/// Outcome of loading one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    /// Destination table.
    pub table: String,
    /// Rows handed to the sink.
    pub total: u64,
    /// Rows in batches the destination accepted.
    pub success: u64,
    /// Rows that failed to serialize or were in a rejected batch.
    pub error: u64,
    /// Why fetching stopped early, if it did.
    pub truncated: Option<String>,
}

impl TableReport {
    /// Creates an empty report for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            total: 0,
            success: 0,
            error: 0,
            truncated: None,
        }
    }

    /// Returns true if no rows were seen at all.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns true if the fetch was cut short.
    pub fn is_truncated(&self) -> bool {
        self.truncated.is_some()
    }

    /// Returns true if every row landed and the fetch ran to completion.
    pub fn is_clean(&self) -> bool {
        self.error == 0 && !self.is_truncated()
    }

    /// Records the fault that cut the fetch short.
    pub fn mark_truncated(&mut self, fault: &SyncError) {
        self.truncated = Some(fault.to_string());
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Mode the run executed in.
    pub mode: SyncMode,
    /// Lower bound of the incremental window.
    pub since: Option<DateTime<Utc>>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// One report per table, in load order.
    pub tables: Vec<TableReport>,
}

impl SyncReport {
    /// Looks up the report of `table`.
    pub fn table(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Rows that landed across all tables.
    pub fn total_success(&self) -> u64 {
        self.tables.iter().map(|t| t.success).sum()
    }

    /// Rows that failed across all tables.
    pub fn total_errors(&self) -> u64 {
        self.tables.iter().map(|t| t.error).sum()
    }

    /// Tables that had errors or were truncated.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.is_clean())
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Returns true if every table is clean.
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableReport::is_clean)
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Renders the end-of-run summary table.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(52);
        let _ = writeln!(out, "run {} ({})", self.run_id, self.mode);
        if let Some(since) = self.since {
            let _ = writeln!(out, "since {}", since.to_rfc3339());
        }
        let elapsed = self.finished_at - self.started_at;
        let _ = writeln!(
            out,
            "finished {} in {}s",
            self.finished_at.to_rfc3339(),
            elapsed.num_seconds()
        );
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  {:<30} {:>8} {:>8}", "table", "ok", "errors");
        let _ = writeln!(out, "{rule}");
        for table in &self.tables {
            let marker = if table.is_clean() { ' ' } else { '!' };
            let _ = write!(
                out,
                "{marker} {:<30} {:>8} {:>8}",
                table.table, table.success, table.error
            );
            if table.is_truncated() {
                out.push_str("  truncated");
            }
            out.push('\n');
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "  {:<30} {:>8} {:>8}",
            "total",
            self.total_success(),
            self.total_errors()
        );
        out
    }
}
