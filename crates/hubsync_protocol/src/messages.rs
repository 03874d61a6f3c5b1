//! Request and response bodies for list, search and batch-read calls.

use crate::record::SourceRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of a listing or search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    /// Records on this page.
    #[serde(default)]
    pub results: Vec<SourceRecord>,
    /// Pagination metadata; absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

impl ListPage {
    /// Creates a page.
    pub fn new(results: Vec<SourceRecord>, next_after: Option<String>) -> Self {
        Self {
            results,
            paging: next_after.map(|after| Paging {
                next: Some(NextPage {
                    after: Value::String(after),
                }),
            }),
        }
    }

    /// Creates the last page of a sequence.
    pub fn last(results: Vec<SourceRecord>) -> Self {
        Self::new(results, None)
    }

    /// Decodes a page from a JSON body.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Returns the cursor for the next page, if any.
    ///
    /// The cursor is normally a string; numeric cursors are accepted and
    /// rendered in decimal. An empty string counts as absent.
    pub fn next_cursor(&self) -> Option<String> {
        let after = &self.paging.as_ref()?.next.as_ref()?.after;
        match after {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    /// Pointer to the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextPage>,
}

/// Pointer to the next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextPage {
    /// Opaque cursor (listing) or numeric offset (search).
    #[serde(default)]
    pub after: Value,
}

/// Comparison operator of a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOperator {
    /// Equal.
    Eq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

/// One property filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Property the filter applies to.
    #[serde(rename = "propertyName")]
    pub property_name: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Comparison value, always sent as a string.
    pub value: String,
}

/// Filters combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    /// Filters in this group.
    pub filters: Vec<Filter>,
}

/// Body of a `POST /crm/v3/objects/{type}/search` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Filter groups combined with OR.
    #[serde(rename = "filterGroups")]
    pub filter_groups: Vec<FilterGroup>,
    /// Properties to return.
    pub properties: Vec<String>,
    /// Page size.
    pub limit: u32,
    /// Numeric offset of the page; omitted on the first request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl SearchRequest {
    /// Creates a request for records whose `property` is at or after
    /// `since_ms` (epoch milliseconds).
    pub fn modified_since(
        property: impl Into<String>,
        since_ms: i64,
        properties: Vec<String>,
        limit: u32,
    ) -> Self {
        Self {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter {
                    property_name: property.into(),
                    operator: FilterOperator::Gte,
                    value: since_ms.to_string(),
                }],
            }],
            properties,
            limit,
            after: None,
        }
    }

    /// Sets the page offset. An offset of zero is the first page and is
    /// omitted from the body.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.after = (offset > 0).then(|| offset.to_string());
        self
    }
}

/// One id in a batch-read request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInput {
    /// Object id.
    pub id: String,
}

/// Body of a `POST /crm/v3/objects/{type}/batch/read` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReadRequest {
    /// Ids to read.
    pub inputs: Vec<BatchInput>,
    /// Properties to return; empty when only associations are wanted.
    pub properties: Vec<String>,
    /// Association types to resolve.
    pub associations: Vec<String>,
}

impl BatchReadRequest {
    /// Creates an association-only lookup for `ids`.
    pub fn associations_for<I, S>(ids: I, association: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: ids.into_iter().map(|id| BatchInput { id: id.into() }).collect(),
            properties: Vec::new(),
            associations: vec![association.into()],
        }
    }
}

/// Response of a batch-read call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReadResponse {
    /// One entry per id the source could resolve.
    #[serde(default)]
    pub results: Vec<SourceRecord>,
}
