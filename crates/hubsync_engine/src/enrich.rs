//! Association enrichment for search results.
//!
//! The search endpoint cannot return associations, so each page is followed
//! by one batch read that fetches them and merges them back in.

use crate::sanitize::canonical_id;
use crate::transport::SourceTransport;
use hubsync_protocol::{Associations, BatchReadRequest, SourceRecord};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Merges association linkage into pages of records.
pub struct AssociationEnricher<'a, T: SourceTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: SourceTransport + ?Sized> AssociationEnricher<'a, T> {
    /// Creates an enricher over `transport`.
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Replaces the associations of every record with those the source
    /// reports under `association`.
    ///
    /// Records the response omits get an empty association set. If the
    /// batch read fails, every record comes back with empty associations.
    pub fn enrich(
        &self,
        object_type: &str,
        mut records: Vec<SourceRecord>,
        association: &str,
    ) -> Vec<SourceRecord> {
        if records.is_empty() {
            return records;
        }
        let ids: Vec<String> = records.iter().filter_map(|r| canonical_id(&r.id)).collect();
        let request = BatchReadRequest::associations_for(ids, association);

        let mut linked: HashMap<String, Associations> = match self
            .transport
            .batch_read(object_type, &request)
        {
            Ok(response) => response
                .results
                .into_iter()
                .filter_map(|r| Some((canonical_id(&r.id)?, r.associations)))
                .collect(),
            Err(err) => {
                warn!(%object_type, %association, records = records.len(), error = %err, "association lookup failed, references will be absent");
                HashMap::new()
            }
        };
        debug!(%object_type, %association, requested = records.len(), linked = linked.len(), "enriched page");

        for record in &mut records {
            record.associations = canonical_id(&record.id)
                .and_then(|id| linked.remove(&id))
                .unwrap_or_default();
        }
        records
    }
}
