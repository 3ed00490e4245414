//! HTTP transport port
//!
//! The executor builds fully-resolved requests and hands them to a
//! transport; retries, breaker bookkeeping and envelope building stay on
//! this side of the port.

use std::time::Duration;

use async_trait::async_trait;
use cosmos_domain::{ApiError, HttpMethod};
use thiserror::Error;
use url::Url;

/// A single HTTP exchange, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: Url,
    /// Headers to send.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Time allowed for this attempt.
    pub timeout: Duration,
}

impl TransportRequest {
    /// First value of a header, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Raw response from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Response with a status and a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    /// Response with a status and no body.
    #[must_use]
    pub const fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// First value of a header, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// `Retry-After` in its delay-seconds form.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Failures below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The attempt ran out of time.
    #[error("request timed out")]
    Timeout,
    /// Could not establish a connection.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The host name did not resolve.
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    /// The request could not be built or sent.
    #[error("request failed: {0}")]
    Request(String),
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        Self::network(error.to_string())
    }
}

/// Port for sending HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request. Non-2xx statuses are responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if no response was received.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_retry_after_seconds() {
        let response = TransportResponse::empty(429).with_header("Retry-After", "7");
        assert_eq!(response.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_http_date_is_ignored() {
        let response = TransportResponse::empty(503)
            .with_header("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(response.retry_after(), None);
    }

    #[test]
    fn test_transport_error_is_network() {
        let error: ApiError = TransportError::Timeout.into();
        assert_eq!(error.kind, cosmos_domain::ErrorKind::Network);
    }
}
