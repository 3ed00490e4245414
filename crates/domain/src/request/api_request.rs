//! Description of one platform API call.

use std::time::Duration;

use serde::Serialize;
use url::Url;

use super::method::HttpMethod;
use crate::error::{DomainError, DomainResult};

/// Version prefix of every platform endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Which credentials to attach to a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestAuth {
    /// Use the current session's bearer token, if any.
    #[default]
    Session,
    /// Use this bearer token regardless of the session.
    Bearer(String),
    /// Send no credentials.
    Anonymous,
}

/// A request to the platform API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path below the base URL, e.g. `/api/v1/datasets`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Overall time budget including retries. Falls back to the client default.
    pub timeout: Option<Duration>,
    /// Credentials to attach.
    pub auth: RequestAuth,
    /// Overrides the method's idempotency, e.g. for POSTs carrying an idempotency key.
    pub idempotent: Option<bool>,
}

impl ApiRequest {
    /// Creates a request with the given method and path.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// PUT request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    /// PATCH request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Serializes `body` as the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be represented as JSON.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> DomainResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| DomainError::invalid("body", e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the overall time budget.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends the given bearer token instead of the session's.
    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.auth = RequestAuth::Bearer(token.into());
        self
    }

    /// Sends no credentials.
    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.auth = RequestAuth::Anonymous;
        self
    }

    /// Marks the request safe (or unsafe) to retry.
    #[must_use]
    pub const fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Whether the request may be retried.
    #[must_use]
    pub fn is_retry_safe(&self) -> bool {
        self.idempotent.unwrap_or_else(|| self.method.is_idempotent())
    }

    /// Resolves the absolute URL against `base`, keeping any path prefix of the base.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidUrl`] if the path has empty, `.` or `..`
    /// segments, or characters that would change its meaning.
    pub fn url(&self, base: &Url) -> DomainResult<Url> {
        let path = format!(
            "{}/{}",
            base.path().trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        if path.split('/').skip(1).any(|segment| matches!(segment, "" | "." | "..")) {
            return Err(DomainError::InvalidUrl(format!("unsafe path: {path}")));
        }
        let mut url = base.clone();
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        if url.path() != path {
            return Err(DomainError::InvalidUrl(format!("unsafe path: {path}")));
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Builds an API path from segments below [`API_PREFIX`]. Each segment is
/// percent-encoded, so ids cannot add segments or a query.
#[must_use]
pub fn api_path(segments: &[&str]) -> String {
    let mut path = String::from(API_PREFIX);
    for segment in segments {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    path
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_url_keeps_base_prefix() {
        let base = Url::parse("https://cosmos.example.com/platform/").unwrap();
        let request = ApiRequest::get("/api/v1/datasets").query("page", 2);
        assert_eq!(
            request.url(&base).unwrap().as_str(),
            "https://cosmos.example.com/platform/api/v1/datasets?page=2"
        );
    }

    #[test]
    fn test_retry_safety() {
        assert!(ApiRequest::get("/x").is_retry_safe());
        assert!(!ApiRequest::post("/x").is_retry_safe());
        assert!(ApiRequest::post("/x").idempotent(true).is_retry_safe());
    }

    #[test]
    fn test_api_path() {
        assert_eq!(api_path(&["training", "jobs", "42"]), "/api/v1/training/jobs/42");
    }

    #[test]
    fn test_ids_stay_inside_their_segment() {
        let base = Url::parse("https://cosmos.example.com").unwrap();

        let path = api_path(&["datasets", "x/../../auth/logout"]);
        assert_eq!(path, "/api/v1/datasets/x%2F..%2F..%2Fauth%2Flogout");
        let url = ApiRequest::get(path).url(&base).unwrap();
        assert_eq!(url.path(), "/api/v1/datasets/x%2F..%2F..%2Fauth%2Flogout");

        let url = ApiRequest::get(api_path(&["datasets", "a?b=c#d"])).url(&base).unwrap();
        assert_eq!(url.path(), "/api/v1/datasets/a%3Fb%3Dc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_dot_and_empty_segments_rejected() {
        let base = Url::parse("https://cosmos.example.com/platform/").unwrap();
        for id in ["..", ".", ""] {
            let request = ApiRequest::delete(api_path(&["datasets", id]));
            assert!(
                matches!(request.url(&base), Err(DomainError::InvalidUrl(_))),
                "{id:?}"
            );
        }
    }

    #[test]
    fn test_with_json() {
        let request = ApiRequest::post("/x")
            .with_json(&serde_json::json!({"name": "clips"}))
            .unwrap();
        assert_eq!(request.body.unwrap()["name"], "clips");
    }
}
