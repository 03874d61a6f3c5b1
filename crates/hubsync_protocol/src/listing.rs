//! Cursor-paginated listing endpoints.
//!
//! HubSpot mixes two listing styles: most object listings take the page
//! size and cursor as query parameters on a GET, while some endpoints take
//! them in a JSON body on a POST. `ListEndpoint` describes either and knows
//! where to put `limit` and `after` for each page.

use serde_json::{Map, Value};

/// HTTP method of a listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMethod {
    /// Page size and cursor travel as query parameters.
    Get,
    /// Page size and cursor travel in the JSON body.
    Post,
}

/// A cursor-paginated listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEndpoint {
    /// Path relative to the API base URL, e.g. `/crm/v3/objects/contacts`.
    pub path: String,
    /// How pagination parameters are sent.
    pub method: ListMethod,
    /// Fixed query parameters sent with every page.
    pub query: Vec<(String, String)>,
    /// Fixed body fields sent with every page (POST only).
    pub body: Map<String, Value>,
}

impl ListEndpoint {
    /// Creates a GET listing endpoint.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: ListMethod::Get,
            query: Vec::new(),
            body: Map::new(),
        }
    }

    /// Creates a POST listing endpoint with a fixed body.
    pub fn post(path: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            method: ListMethod::Post,
            query: Vec::new(),
            body,
        }
    }

    /// Adds a fixed query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Query parameters for one page request.
    pub fn page_query(&self, limit: u32, after: Option<&str>) -> Vec<(String, String)> {
        let mut query = self.query.clone();
        if self.method == ListMethod::Get {
            query.push(("limit".into(), limit.to_string()));
            if let Some(after) = after {
                query.push(("after".into(), after.to_string()));
            }
        }
        query
    }

    /// JSON body for one page request, `None` for GET endpoints.
    pub fn page_body(&self, limit: u32, after: Option<&str>) -> Option<Value> {
        if self.method == ListMethod::Get {
            return None;
        }
        let mut body = self.body.clone();
        body.insert("limit".into(), Value::from(limit));
        if let Some(after) = after {
            body.insert("after".into(), Value::from(after));
        }
        Some(Value::Object(body))
    }
}
