//! HTTP transport implementation.
//!
//! The engine never links an HTTP library itself. The actual client is
//! abstracted behind [`HttpClient`] so that the binary can plug in
//! `reqwest`, and tests can plug in canned responses.

use crate::error::{SyncError, SyncResult};
use crate::transport::SourceTransport;
use hubsync_protocol::{
    BatchReadRequest, BatchReadResponse, ListEndpoint, ListPage, SearchRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// A single HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request with a JSON body.
    pub fn post_json<B: Serialize + ?Sized>(url: impl Into<String>, body: &B) -> SyncResult<Self> {
        let body = serde_json::to_vec(body)
            .map_err(|e| SyncError::Decode(format!("failed to encode request: {e}")))?;
        Ok(Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(body),
        })
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Appends query parameters.
    pub fn with_query_pairs(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a bearer `Authorization` header.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    /// Returns the value of the first header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of the first query parameter named `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a 200 response with a JSON body.
    pub fn json<T: Serialize + ?Sized>(body: &T) -> Self {
        Self::new(200, serde_json::to_vec(body).unwrap_or_default())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fails with [`SyncError::Status`] unless the status is 2xx.
    pub fn error_for_status(self) -> SyncResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::status(
                self.status,
                &String::from_utf8_lossy(&self.body),
            ))
        }
    }

    /// Decodes the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> SyncResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| SyncError::Decode(format!("failed to decode response: {e}")))
    }
}

/// HTTP client abstraction.
///
/// Implementations own connection handling and the per-call deadline and
/// must report an expired deadline as [`SyncError::Timeout`].
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        (**self).send(request)
    }
}

/// HubSpot CRM v3 transport over an [`HttpClient`].
///
/// Authenticates every call with a static bearer token.
pub struct HubSpotTransport<C: HttpClient> {
    base_url: String,
    token: String,
    client: C,
}

impl<C: HttpClient> HubSpotTransport<C> {
    /// Creates a transport rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn call<T: DeserializeOwned>(&self, request: HttpRequest) -> SyncResult<T> {
        debug!(url = %request.url, "source request");
        self.client
            .send(request.with_bearer(&self.token))?
            .error_for_status()?
            .decode()
    }
}

impl<C: HttpClient> SourceTransport for HubSpotTransport<C> {
    fn list_page(
        &self,
        endpoint: &ListEndpoint,
        limit: u32,
        after: Option<&str>,
    ) -> SyncResult<ListPage> {
        let url = self.url(&endpoint.path);
        let request = match endpoint.page_body(limit, after) {
            Some(body) => HttpRequest::post_json(url, &body)?,
            None => HttpRequest::get(url),
        };
        self.call(request.with_query_pairs(endpoint.page_query(limit, after)))
    }

    fn search_page(&self, object_type: &str, request: &SearchRequest) -> SyncResult<ListPage> {
        let url = self.url(&format!("/crm/v3/objects/{object_type}/search"));
        self.call(HttpRequest::post_json(url, request)?)
    }

    fn batch_read(
        &self,
        object_type: &str,
        request: &BatchReadRequest,
    ) -> SyncResult<BatchReadResponse> {
        let url = self.url(&format!("/crm/v3/objects/{object_type}/batch/read"));
        self.call(HttpRequest::post_json(url, request)?)
    }
}
