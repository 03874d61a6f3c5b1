//! Full versus incremental mode selection.

use crate::config::SyncConfig;
use crate::destination::DestinationStore;
use crate::entity::EntityKind;
use crate::error::{SyncError, SyncResult};
use crate::sanitize::parse_timestamp;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// How a run fetches incremental-eligible entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every record is listed.
    Full,
    /// Only records modified since a watermark are searched.
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// The mode decision of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPlan {
    /// Selected mode.
    pub mode: SyncMode,
    /// Lower bound of the modification window; set only when incremental.
    pub since: Option<DateTime<Utc>>,
}

impl SyncPlan {
    /// A full run.
    pub fn full() -> Self {
        Self {
            mode: SyncMode::Full,
            since: None,
        }
    }

    /// An incremental run from `since`.
    pub fn incremental(since: DateTime<Utc>) -> Self {
        Self {
            mode: SyncMode::Incremental,
            since: Some(since),
        }
    }

    /// Returns the window start when incremental.
    pub fn incremental_since(&self) -> Option<DateTime<Utc>> {
        match self.mode {
            SyncMode::Incremental => self.since,
            SyncMode::Full => None,
        }
    }
}

/// Decides the mode from the destination's watermarks.
///
/// The run is incremental only when every watermark table has one; the
/// window then starts at the oldest watermark minus the safety margin.
#[derive(Debug, Clone)]
pub struct SyncModeResolver {
    tables: Vec<EntityKind>,
    margin: Duration,
}

impl SyncModeResolver {
    /// Creates a resolver over `tables`.
    pub fn new(tables: Vec<EntityKind>, margin: Duration) -> Self {
        Self { tables, margin }
    }

    /// Creates a resolver from the run configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.watermark_tables.clone(), config.safety_margin)
    }

    /// Resolves the plan. A failing watermark read is returned as an error.
    pub fn resolve(&self, store: &dyn DestinationStore) -> SyncResult<SyncPlan> {
        let mut oldest: Option<DateTime<Utc>> = None;

        for kind in &self.tables {
            let table = kind.table();
            let watermark = store
                .latest_extraction(table)?
                .and_then(|raw| parse_timestamp(&raw));
            let Some(watermark) = watermark else {
                info!(%table, "no watermark, running full sync");
                return Ok(SyncPlan::full());
            };
            info!(%table, watermark = %watermark.to_rfc3339(), "found watermark");
            oldest = Some(oldest.map_or(watermark, |o| o.min(watermark)));
        }

        let Some(oldest) = oldest else {
            return Ok(SyncPlan::full());
        };
        let margin = TimeDelta::from_std(self.margin)
            .map_err(|_| SyncError::Config("safety margin out of range".into()))?;
        let since = oldest
            .checked_sub_signed(margin)
            .ok_or_else(|| SyncError::Config("safety margin out of range".into()))?;
        info!(since = %since.to_rfc3339(), "running incremental sync");
        Ok(SyncPlan::incremental(since))
    }
}
