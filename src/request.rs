// Request options
// Caller-supplied shape of an authenticated request, shared by both
// execution modes.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Options for an authenticated request.
///
/// Headers given here are merged into the outgoing request; the session's
/// auth header always takes precedence over a caller-supplied one of the
/// same name.
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    /// Extra headers to send.
    pub headers: HeaderMap,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// JSON request body.
    pub json: Option<serde_json::Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }
}
