//! Configuration for a sync run.

use crate::entity::EntityKind;
use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Default HubSpot API base URL.
pub const DEFAULT_HUBSPOT_BASE_URL: &str = "https://api.hubapi.com";

/// Configuration for a sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source API base URL.
    pub hubspot_base_url: String,
    /// Records requested per source page.
    pub api_page_size: u32,
    /// Rows per destination upsert call.
    pub upsert_batch_size: usize,
    /// Ids read per page when pre-loading validity snapshots.
    pub id_scan_page_size: usize,
    /// Subtracted from the oldest watermark to get the incremental bound.
    pub safety_margin: Duration,
    /// Deadline for each network call.
    pub request_timeout: Duration,
    /// Tag written to every row's `_source_system` column.
    pub source_system: String,
    /// Property the incremental search filters on.
    pub modified_property: String,
    /// Object type id of the commission custom object.
    pub commission_object_type: String,
    /// Tables whose watermarks decide the sync mode.
    pub watermark_tables: Vec<EntityKind>,
}

impl SyncConfig {
    /// Creates a configuration with the default sizes and margins.
    pub fn new() -> Self {
        Self {
            hubspot_base_url: DEFAULT_HUBSPOT_BASE_URL.to_string(),
            api_page_size: 100,
            upsert_batch_size: 200,
            id_scan_page_size: 1000,
            safety_margin: Duration::from_secs(60 * 60),
            request_timeout: Duration::from_secs(30),
            source_system: "HubSpot".to_string(),
            modified_property: "hs_lastmodifieddate".to_string(),
            commission_object_type: "2-45314755".to_string(),
            watermark_tables: vec![EntityKind::Contact, EntityKind::Deal],
        }
    }

    /// Sets the source API base URL.
    pub fn with_hubspot_base_url(mut self, url: impl Into<String>) -> Self {
        self.hubspot_base_url = url.into();
        self
    }

    /// Sets the source page size.
    pub fn with_api_page_size(mut self, size: u32) -> Self {
        self.api_page_size = size;
        self
    }

    /// Sets the upsert batch size.
    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size;
        self
    }

    /// Sets the id scan page size.
    pub fn with_id_scan_page_size(mut self, size: usize) -> Self {
        self.id_scan_page_size = size;
        self
    }

    /// Sets the incremental safety margin.
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the source system tag.
    pub fn with_source_system(mut self, tag: impl Into<String>) -> Self {
        self.source_system = tag.into();
        self
    }

    /// Sets the commission custom object type id.
    pub fn with_commission_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.commission_object_type = object_type.into();
        self
    }

    /// Sets the watermark tables.
    pub fn with_watermark_tables(mut self, tables: Vec<EntityKind>) -> Self {
        self.watermark_tables = tables;
        self
    }

    /// Checks that sizes are usable.
    pub fn validate(&self) -> SyncResult<()> {
        if self.api_page_size == 0 {
            return Err(SyncError::Config("api_page_size must be positive".into()));
        }
        if self.upsert_batch_size == 0 {
            return Err(SyncError::Config(
                "upsert_batch_size must be positive".into(),
            ));
        }
        if self.id_scan_page_size == 0 {
            return Err(SyncError::Config(
                "id_scan_page_size must be positive".into(),
            ));
        }
        if self.watermark_tables.is_empty() {
            return Err(SyncError::Config(
                "at least one watermark table is required".into(),
            ));
        }
        if self.hubspot_base_url.is_empty() {
            return Err(SyncError::Config("hubspot_base_url is empty".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.api_page_size, 100);
        assert_eq!(config.upsert_batch_size, 200);
        assert_eq!(config.id_scan_page_size, 1000);
        assert_eq!(config.safety_margin, Duration::from_secs(3600));
        assert_eq!(config.source_system, "HubSpot");
        assert_eq!(
            config.watermark_tables,
            vec![EntityKind::Contact, EntityKind::Deal]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder() {
        let config = SyncConfig::new()
            .with_hubspot_base_url("http://localhost:9000")
            .with_api_page_size(10)
            .with_upsert_batch_size(5)
            .with_safety_margin(Duration::from_secs(60))
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.hubspot_base_url, "http://localhost:9000");
        assert_eq!(config.api_page_size, 10);
        assert_eq!(config.upsert_batch_size, 5);
        assert_eq!(config.safety_margin, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(SyncConfig::new().with_upsert_batch_size(0).validate().is_err());
        assert!(SyncConfig::new().with_api_page_size(0).validate().is_err());
        assert!(SyncConfig::new().with_id_scan_page_size(0).validate().is_err());
        assert!(SyncConfig::new()
            .with_watermark_tables(Vec::new())
            .validate()
            .is_err());
    }
}
