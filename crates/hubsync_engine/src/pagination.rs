//! Lazy, single-pass record streams over paginated source endpoints.
//!
//! A [`RecordStream`] fetches one page at a time and hands out its records
//! before fetching the next. Any fault on a page fetch ends the stream:
//! records already yielded stay yielded, and the fault is kept on the
//! stream for the caller to inspect once it is exhausted.

use crate::enrich::AssociationEnricher;
use crate::error::{SyncError, SyncResult};
use crate::transport::SourceTransport;
use chrono::{DateTime, Utc};
use hubsync_protocol::{ListEndpoint, ListPage, SearchRequest, SourceRecord};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Builds record streams over a source transport.
pub struct PaginatedSource<'a, T: SourceTransport + ?Sized> {
    transport: &'a T,
    modified_property: String,
}

impl<'a, T: SourceTransport + ?Sized> PaginatedSource<'a, T> {
    /// Creates a source filtering incremental searches on `modified_property`.
    pub fn new(transport: &'a T, modified_property: impl Into<String>) -> Self {
        Self {
            transport,
            modified_property: modified_property.into(),
        }
    }

    /// Streams every record of a cursor-paginated listing.
    pub fn fetch_full(&self, endpoint: ListEndpoint, page_size: u32) -> RecordStream<'a, T> {
        let label = endpoint.path.clone();
        RecordStream::new(self.transport, label, PageQuery::Listing { endpoint, page_size })
    }

    /// Streams the records of `object_type` modified at or after `since`.
    ///
    /// With an `association`, every page is enriched through a batch read
    /// before its records are handed out.
    pub fn fetch_incremental(
        &self,
        object_type: &str,
        properties: Vec<String>,
        since: DateTime<Utc>,
        page_size: u32,
        association: Option<&str>,
    ) -> RecordStream<'a, T> {
        let request = SearchRequest::modified_since(
            self.modified_property.clone(),
            since.timestamp_millis(),
            properties,
            page_size,
        );
        let mut stream = RecordStream::new(
            self.transport,
            object_type.to_string(),
            PageQuery::Search {
                object_type: object_type.to_string(),
                request,
            },
        );
        if let Some(association) = association {
            stream.enrichment = Some((
                AssociationEnricher::new(self.transport),
                association.to_string(),
            ));
        }
        stream
    }
}

enum PageQuery {
    Listing {
        endpoint: ListEndpoint,
        page_size: u32,
    },
    Search {
        object_type: String,
        request: SearchRequest,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Cursor {
    Token(String),
    Offset(u64),
}

/// A finite, single-pass sequence of raw records.
pub struct RecordStream<'a, T: SourceTransport + ?Sized> {
    transport: &'a T,
    label: String,
    query: PageQuery,
    enrichment: Option<(AssociationEnricher<'a, T>, String)>,
    cursor: Option<Cursor>,
    seen: HashSet<Cursor>,
    buffer: std::vec::IntoIter<SourceRecord>,
    exhausted: bool,
    reported: bool,
    fault: Option<SyncError>,
    yielded: u64,
    pages: u64,
}

impl<'a, T: SourceTransport + ?Sized> RecordStream<'a, T> {
    fn new(transport: &'a T, label: String, query: PageQuery) -> Self {
        Self {
            transport,
            label,
            query,
            enrichment: None,
            cursor: None,
            seen: HashSet::new(),
            buffer: Vec::new().into_iter(),
            exhausted: false,
            reported: false,
            fault: None,
            yielded: 0,
            pages: 0,
        }
    }

    /// The fault that ended the stream early, if any.
    pub fn fault(&self) -> Option<&SyncError> {
        self.fault.as_ref()
    }

    /// Takes the fault that ended the stream early, if any.
    pub fn take_fault(&mut self) -> Option<SyncError> {
        self.fault.take()
    }

    /// Records handed out so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> u64 {
        self.pages
    }

    fn fetch_page(&self) -> SyncResult<ListPage> {
        match &self.query {
            PageQuery::Listing {
                endpoint,
                page_size,
            } => {
                let after = match &self.cursor {
                    Some(Cursor::Token(token)) => Some(token.as_str()),
                    _ => None,
                };
                self.transport.list_page(endpoint, *page_size, after)
            }
            PageQuery::Search {
                object_type,
                request,
            } => {
                let offset = match self.cursor {
                    Some(Cursor::Offset(offset)) => offset,
                    _ => 0,
                };
                self.transport
                    .search_page(object_type, &request.clone().with_offset(offset))
            }
        }
    }

    fn next_cursor(&self, page: &ListPage) -> SyncResult<Option<Cursor>> {
        let Some(raw) = page.next_cursor() else {
            return Ok(None);
        };
        let repeated = format!("cursor {raw:?} was already visited");
        let next = match self.query {
            PageQuery::Listing { .. } => Cursor::Token(raw),
            PageQuery::Search { .. } => Cursor::Offset(raw.parse().map_err(|_| {
                SyncError::Decode(format!("search offset {raw:?} is not numeric"))
            })?),
        };
        if self.seen.contains(&next) {
            return Err(SyncError::Decode(repeated));
        }
        Ok(Some(next))
    }

    fn load_next_page(&mut self) {
        let page = match self.fetch_page() {
            Ok(page) => page,
            Err(err) => {
                warn!(source = %self.label, page = self.pages + 1, error = %err, "page fetch failed, stopping early");
                self.fault = Some(err);
                self.exhausted = true;
                return;
            }
        };
        self.pages += 1;

        match self.next_cursor(&page) {
            Ok(Some(cursor)) => {
                self.seen.insert(cursor.clone());
                self.cursor = Some(cursor);
            }
            Ok(None) => self.exhausted = true,
            Err(err) => {
                warn!(source = %self.label, error = %err, "bad pagination cursor, stopping after this page");
                self.fault = Some(err);
                self.exhausted = true;
            }
        }

        let mut records = page.results;
        if let (Some((enricher, association)), PageQuery::Search { object_type, .. }) =
            (&self.enrichment, &self.query)
        {
            records = enricher.enrich(object_type, records, association);
        }
        debug!(source = %self.label, page = self.pages, records = records.len(), "fetched page");
        self.buffer = records.into_iter();
    }
}

impl<T: SourceTransport + ?Sized> Iterator for RecordStream<'_, T> {
    type Item = SourceRecord;

    fn next(&mut self) -> Option<SourceRecord> {
        loop {
            if let Some(record) = self.buffer.next() {
                self.yielded += 1;
                return Some(record);
            }
            if self.exhausted {
                if !self.reported {
                    self.reported = true;
                    info!(source = %self.label, records = self.yielded, pages = self.pages, complete = self.fault.is_none(), "source exhausted");
                }
                return None;
            }
            self.load_next_page();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, SourceCall};
    use chrono::TimeZone;
    use hubsync_protocol::{BatchReadRequest, BatchReadResponse};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;

    fn records(ids: &[&str]) -> Vec<SourceRecord> {
        ids.iter().map(|id| SourceRecord::new(*id)).collect()
    }

    fn ids(stream: impl Iterator<Item = SourceRecord>) -> Vec<String> {
        stream
            .map(|r| r.id.as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn full_fetch_yields_union_of_pages_in_order() {
        let transport = MockTransport::new();
        transport.set_list_pages(
            "/crm/v3/owners/",
            vec![records(&["1", "2"]), records(&["3", "4"]), records(&["5"])],
        );
        let source = PaginatedSource::new(&transport, "hs_lastmodifieddate");

        let mut stream = source.fetch_full(ListEndpoint::get("/crm/v3/owners/"), 2);
        let seen: Vec<String> = ids(stream.by_ref());
        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(stream.pages(), 3);
        assert_eq!(stream.yielded(), 5);
        assert!(stream.fault().is_none());
        assert!(stream.next().is_none());
        assert_eq!(transport.list_calls("/crm/v3/owners/"), 3);
    }

    #[test]
    fn stream_is_lazy() {
        let transport = MockTransport::new();
        transport.set_list_pages("/x", vec![records(&["1", "2"]), records(&["3"])]);
        let source = PaginatedSource::new(&transport, "p");

        let mut stream = source.fetch_full(ListEndpoint::get("/x"), 2);
        assert_eq!(transport.list_calls("/x"), 0);
        stream.next();
        assert_eq!(transport.list_calls("/x"), 1);
        stream.next();
        assert_eq!(transport.list_calls("/x"), 1);
        stream.next();
        assert_eq!(transport.list_calls("/x"), 2);
    }

    #[test]
    fn page_fault_truncates_but_keeps_earlier_records() {
        let transport = MockTransport::new();
        transport.set_list_pages(
            "/x",
            vec![records(&["1", "2"]), records(&["3"]), records(&["4"])],
        );
        transport.fail_list_page("/x", 1);
        let source = PaginatedSource::new(&transport, "p");

        let mut stream = source.fetch_full(ListEndpoint::get("/x"), 2);
        assert_eq!(ids(stream.by_ref()), vec!["1", "2"]);
        assert!(stream.fault().is_some_and(SyncError::is_transient));
        assert_eq!(transport.list_calls("/x"), 2);
    }

    #[test]
    fn empty_listing_terminates() {
        let transport = MockTransport::new();
        let source = PaginatedSource::new(&transport, "p");
        let mut stream = source.fetch_full(ListEndpoint::get("/nothing"), 100);
        assert!(stream.next().is_none());
        assert_eq!(stream.pages(), 1);
    }

    #[test]
    fn incremental_fetch_carries_numeric_offset() {
        let transport = MockTransport::new();
        transport.set_search_pages("contacts", vec![records(&["1", "2"]), records(&["3"])]);
        let source = PaginatedSource::new(&transport, "hs_lastmodifieddate");
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let stream =
            source.fetch_incremental("contacts", vec!["email".into()], since, 2, None);
        assert_eq!(ids(stream), vec!["1", "2", "3"]);

        let calls = transport.search_calls("contacts");
        assert_eq!(
            calls,
            vec![
                SourceCall::Search {
                    object_type: "contacts".into(),
                    since_ms: Some(since.timestamp_millis().to_string()),
                    after: None,
                },
                SourceCall::Search {
                    object_type: "contacts".into(),
                    since_ms: Some(since.timestamp_millis().to_string()),
                    after: Some("2".into()),
                },
            ]
        );
    }

    #[test]
    fn incremental_fetch_enriches_each_page() {
        let transport = MockTransport::new();
        transport.set_search_pages("deals", vec![records(&["d1", "d2"]), records(&["d3"])]);
        transport.set_associations(
            "deals",
            "contacts",
            HashMap::from([("d1".to_string(), vec!["c1".to_string()])]),
        );
        let source = PaginatedSource::new(&transport, "p");
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let enriched: Vec<SourceRecord> = source
            .fetch_incremental("deals", Vec::new(), since, 2, Some("contacts"))
            .collect();
        assert_eq!(enriched.len(), 3);
        assert_eq!(
            enriched[0].first_association("contacts"),
            Some(&Value::from("c1"))
        );
        assert!(enriched[1].first_association("contacts").is_none());

        let batch_reads: Vec<_> = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SourceCall::BatchRead { .. }))
            .collect();
        assert_eq!(
            batch_reads,
            vec![
                SourceCall::BatchRead { object_type: "deals".into(), ids: 2 },
                SourceCall::BatchRead { object_type: "deals".into(), ids: 1 },
            ]
        );
    }

    #[test]
    fn search_timeout_ends_stream() {
        let transport = MockTransport::new();
        transport.set_search_pages("deals", vec![records(&["1"]), records(&["2"])]);
        transport.fail_search_page("deals", 1);
        let source = PaginatedSource::new(&transport, "p");
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut stream = source.fetch_incremental("deals", Vec::new(), since, 1, None);
        assert_eq!(ids(stream.by_ref()), vec!["1"]);
        assert!(matches!(stream.take_fault(), Some(SyncError::Timeout)));
    }

    /// Serves listing pages whose cursors cycle through a fixed sequence.
    struct CyclingTransport {
        cursors: Vec<&'static str>,
        served: Mutex<usize>,
    }

    impl SourceTransport for CyclingTransport {
        fn list_page(
            &self,
            _endpoint: &ListEndpoint,
            _limit: u32,
            _after: Option<&str>,
        ) -> SyncResult<ListPage> {
            let mut served = self.served.lock();
            let next = self.cursors[*served % self.cursors.len()];
            *served += 1;
            let id = (*served).to_string();
            Ok(ListPage::new(records(&[id.as_str()]), Some(next.to_string())))
        }

        fn search_page(&self, _object_type: &str, _request: &SearchRequest) -> SyncResult<ListPage> {
            Err(SyncError::status(400, "search not scripted"))
        }

        fn batch_read(
            &self,
            _object_type: &str,
            _request: &BatchReadRequest,
        ) -> SyncResult<BatchReadResponse> {
            Err(SyncError::status(400, "batch read not scripted"))
        }
    }

    #[test]
    fn repeated_cursor_stops_a_cycling_listing() {
        let transport = CyclingTransport {
            cursors: vec!["A", "B"],
            served: Mutex::new(0),
        };
        let source = PaginatedSource::new(&transport, "p");

        let mut stream = source.fetch_full(ListEndpoint::get("/loop"), 1);
        assert_eq!(ids(stream.by_ref()), vec!["1", "2", "3"]);
        assert_eq!(stream.pages(), 3);
        assert!(matches!(stream.take_fault(), Some(SyncError::Decode(msg)) if msg.contains("\"A\"")));
    }

    #[test]
    fn stuck_cursor_is_a_fault() {
        let transport = CyclingTransport {
            cursors: vec!["same"],
            served: Mutex::new(0),
        };
        let source = PaginatedSource::new(&transport, "p");

        let mut stream = source.fetch_full(ListEndpoint::get("/stuck"), 1);
        assert_eq!(ids(stream.by_ref()), vec!["1", "2"]);
        assert!(stream.fault().is_some_and(|f| !f.is_transient()));
    }
}
