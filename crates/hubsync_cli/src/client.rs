//! `reqwest` implementation of the engine's HTTP client.

use hubsync_engine::{HttpClient, HttpMethod, HttpRequest, HttpResponse, SyncError, SyncResult};
use reqwest::blocking::Client;
use reqwest::Method;
use std::time::Duration;

/// Blocking HTTP client with a fixed per-call deadline.
pub struct ReqwestClient {
    inner: Client,
}

impl ReqwestClient {
    /// Builds a client whose calls time out after `timeout`.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hubsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }
}

fn map_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        SyncError::transport_retryable(err.to_string())
    } else {
        SyncError::transport_fatal(err.to_string())
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self.inner.request(method, &request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(map_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(map_error)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
