//! Source transport abstraction.

use crate::error::{SyncError, SyncResult};
use hubsync_protocol::{
    BatchReadRequest, BatchReadResponse, ListEndpoint, ListPage, SearchRequest, SourceRecord,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A source transport handles communication with the CRM API.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.). Every method is one
/// blocking call.
pub trait SourceTransport: Send + Sync {
    /// Fetches one page of a cursor-paginated listing.
    fn list_page(
        &self,
        endpoint: &ListEndpoint,
        limit: u32,
        after: Option<&str>,
    ) -> SyncResult<ListPage>;

    /// Fetches one page of a filtered search over `object_type`.
    fn search_page(&self, object_type: &str, request: &SearchRequest) -> SyncResult<ListPage>;

    /// Reads objects of `object_type` in bulk, typically for their associations.
    fn batch_read(
        &self,
        object_type: &str,
        request: &BatchReadRequest,
    ) -> SyncResult<BatchReadResponse>;
}

/// A call recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceCall {
    /// A listing page request.
    List {
        /// Endpoint path.
        path: String,
        /// Fixed query parameters of the endpoint.
        query: Vec<(String, String)>,
        /// Cursor sent.
        after: Option<String>,
    },
    /// A search page request.
    Search {
        /// Object type searched.
        object_type: String,
        /// Value of the modification filter.
        since_ms: Option<String>,
        /// Offset sent.
        after: Option<String>,
    },
    /// A batch-read request.
    BatchRead {
        /// Object type read.
        object_type: String,
        /// Number of ids requested.
        ids: usize,
    },
}

#[derive(Debug, Default)]
struct Script {
    listings: HashMap<String, Vec<Vec<SourceRecord>>>,
    searches: HashMap<String, Vec<Vec<SourceRecord>>>,
    associations: HashMap<(String, String), HashMap<String, Vec<String>>>,
    failing_list_pages: HashSet<(String, usize)>,
    failing_search_pages: HashSet<(String, usize)>,
    failing_batch_reads: HashSet<String>,
}

/// A scripted transport for testing.
///
/// Listings are served page by page with cursors `c1`, `c2`, ...; searches
/// are served with numeric offsets equal to the number of records already
/// returned, as the real search endpoint does.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<Script>,
    calls: Mutex<Vec<SourceCall>>,
}

impl MockTransport {
    /// Creates a transport with nothing scripted. Unscripted endpoints
    /// answer with an empty last page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the pages of a listing endpoint.
    pub fn set_list_pages(&self, path: &str, pages: Vec<Vec<SourceRecord>>) {
        self.script.lock().listings.insert(path.to_string(), pages);
    }

    /// Scripts the pages of a search over `object_type`.
    pub fn set_search_pages(&self, object_type: &str, pages: Vec<Vec<SourceRecord>>) {
        self.script
            .lock()
            .searches
            .insert(object_type.to_string(), pages);
    }

    /// Scripts the associations a batch read returns for `object_type`.
    /// Ids missing from `links` are omitted from the response.
    pub fn set_associations(
        &self,
        object_type: &str,
        association: &str,
        links: HashMap<String, Vec<String>>,
    ) {
        self.script
            .lock()
            .associations
            .insert((object_type.to_string(), association.to_string()), links);
    }

    /// Makes the page at `index` of a listing fail.
    pub fn fail_list_page(&self, path: &str, index: usize) {
        self.script
            .lock()
            .failing_list_pages
            .insert((path.to_string(), index));
    }

    /// Makes the page at `index` of a search fail.
    pub fn fail_search_page(&self, object_type: &str, index: usize) {
        self.script
            .lock()
            .failing_search_pages
            .insert((object_type.to_string(), index));
    }

    /// Makes every batch read of `object_type` fail.
    pub fn fail_batch_reads(&self, object_type: &str) {
        self.script
            .lock()
            .failing_batch_reads
            .insert(object_type.to_string());
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    /// Returns the listing calls made against `path`.
    pub fn list_calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, SourceCall::List { path: p, .. } if p == path))
            .count()
    }

    /// Returns the search calls made against `object_type`.
    pub fn search_calls(&self, object_type: &str) -> Vec<SourceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| {
                matches!(call, SourceCall::Search { object_type: t, .. } if t == object_type)
            })
            .cloned()
            .collect()
    }

    fn page_index_for_cursor(after: Option<&str>) -> Option<usize> {
        match after {
            None => Some(0),
            Some(cursor) => cursor.strip_prefix('c')?.parse().ok(),
        }
    }

    fn page_index_for_offset(pages: &[Vec<SourceRecord>], after: Option<&str>) -> Option<usize> {
        let offset: usize = match after {
            None => return Some(0),
            Some(raw) => raw.parse().ok()?,
        };
        let mut start = 0;
        for (index, page) in pages.iter().enumerate() {
            if start == offset {
                return Some(index);
            }
            start += page.len();
        }
        None
    }
}

impl SourceTransport for MockTransport {
    fn list_page(
        &self,
        endpoint: &ListEndpoint,
        _limit: u32,
        after: Option<&str>,
    ) -> SyncResult<ListPage> {
        self.calls.lock().push(SourceCall::List {
            path: endpoint.path.clone(),
            query: endpoint.query.clone(),
            after: after.map(str::to_string),
        });

        let script = self.script.lock();
        let index = Self::page_index_for_cursor(after)
            .ok_or_else(|| SyncError::status(400, "unknown cursor"))?;
        if script
            .failing_list_pages
            .contains(&(endpoint.path.clone(), index))
        {
            return Err(SyncError::transport_retryable("connection reset by peer"));
        }
        let Some(pages) = script.listings.get(&endpoint.path) else {
            return Ok(ListPage::last(Vec::new()));
        };
        let results = pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < pages.len()).then(|| format!("c{}", index + 1));
        Ok(ListPage::new(results, next))
    }

    fn search_page(&self, object_type: &str, request: &SearchRequest) -> SyncResult<ListPage> {
        let since_ms = request
            .filter_groups
            .first()
            .and_then(|group| group.filters.first())
            .map(|filter| filter.value.clone());
        self.calls.lock().push(SourceCall::Search {
            object_type: object_type.to_string(),
            since_ms,
            after: request.after.clone(),
        });

        let script = self.script.lock();
        let Some(pages) = script.searches.get(object_type) else {
            return Ok(ListPage::last(Vec::new()));
        };
        let index = Self::page_index_for_offset(pages, request.after.as_deref())
            .ok_or_else(|| SyncError::status(400, "unknown offset"))?;
        if script
            .failing_search_pages
            .contains(&(object_type.to_string(), index))
        {
            return Err(SyncError::Timeout);
        }
        let results = pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < pages.len()).then(|| {
            pages[..=index]
                .iter()
                .map(Vec::len)
                .sum::<usize>()
                .to_string()
        });
        Ok(ListPage::new(results, next))
    }

    fn batch_read(
        &self,
        object_type: &str,
        request: &BatchReadRequest,
    ) -> SyncResult<BatchReadResponse> {
        self.calls.lock().push(SourceCall::BatchRead {
            object_type: object_type.to_string(),
            ids: request.inputs.len(),
        });

        let script = self.script.lock();
        if script.failing_batch_reads.contains(object_type) {
            return Err(SyncError::status(500, "internal error"));
        }
        let association = request.associations.first().cloned().unwrap_or_default();
        let links = script
            .associations
            .get(&(object_type.to_string(), association.clone()));

        let results = request
            .inputs
            .iter()
            .filter_map(|input| {
                let targets = links?.get(&input.id)?;
                let mut record = SourceRecord::new(Value::String(input.id.clone()));
                for target in targets {
                    record.associations.push(association.clone(), target.clone());
                }
                Some(record)
            })
            .collect();
        Ok(BatchReadResponse { results })
    }
}
