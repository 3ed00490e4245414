//! API request executor.
//!
//! Wraps every platform call with credentials, a request id, the shared
//! circuit breaker and bounded retries, and reports the outcome in an
//! [`ApiResponse`] envelope.

use std::sync::Arc;
use std::time::Duration;

use cosmos_domain::{
    ApiError, ApiRequest, ApiResponse, REQUEST_ID_HEADER, RequestAuth, ResponseMetadata,
    generate_request_id,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::{CircuitBreaker, RetryPolicy};
use crate::ports::{AccessTokenSource, Clock, HttpTransport, TransportRequest, TransportResponse};

/// Executes [`ApiRequest`]s against the platform.
///
/// Cheap to clone; clones share the transport and the breaker.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    base_url: Url,
    default_timeout: Duration,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

/// What one attempt produced.
enum Attempt {
    Done(Result<Vec<u8>, ApiError>),
    Retry {
        error: ApiError,
        retry_after: Option<Duration>,
    },
}

impl RequestExecutor {
    /// Creates an executor without a session token source.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
        base_url: Url,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            breaker,
            retry,
            clock,
            base_url,
            default_timeout,
            tokens: None,
        }
    }

    /// Returns a clone that attaches the source's token to session-authenticated requests.
    #[must_use]
    pub fn with_token_source(&self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            tokens: Some(tokens),
            ..self.clone()
        }
    }

    /// The breaker shared by every clone.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends `request` and decodes a successful body as `T`. An empty body
    /// decodes as JSON `null`.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResponse<T> {
        let started = Instant::now();
        let request_id = generate_request_id();
        let (outcome, attempts) = self.execute(&request, &request_id, started).await;
        let result = outcome.and_then(|body| decode::<T>(&body));
        if let Err(error) = &result {
            debug!(
                request_id = %request_id,
                method = %request.method,
                path = %request.path,
                kind = %error.kind,
                attempts,
                "request failed"
            );
        }
        self.envelope(result, request_id, started, attempts)
    }

    /// Serializes `body` into the request and sends it.
    pub async fn request_json<B, T>(&self, request: ApiRequest, body: &B) -> ApiResponse<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        match request.with_json(body) {
            Ok(request) => self.request(request).await,
            Err(error) => self.rejected(error.into()),
        }
    }

    /// Envelope for a request refused before anything was sent.
    #[must_use]
    pub fn rejected<T>(&self, error: ApiError) -> ApiResponse<T> {
        self.envelope(Err(error), generate_request_id(), Instant::now(), 0)
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        request_id: &str,
        started: Instant,
    ) -> (Result<Vec<u8>, ApiError>, u32) {
        let url = match request.url(&self.base_url) {
            Ok(url) => url,
            Err(error) => return (Err(error.into()), 0),
        };
        let budget = request.timeout.unwrap_or(self.default_timeout);
        let deadline = started + budget;
        let retry_safe = request.is_retry_safe();
        let headers = self.headers(request, request_id);

        let mut attempts = 0u32;
        let mut last_error: Option<ApiError> = None;
        loop {
            if !self.breaker.try_acquire() {
                debug!(request_id, "circuit open, failing fast");
                return (Err(last_error.unwrap_or_else(ApiError::circuit_open)), attempts);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let error = last_error.unwrap_or_else(|| ApiError::network("request timed out"));
                return (Err(error), attempts);
            }

            attempts += 1;
            debug!(request_id, method = %request.method, %url, attempt = attempts, "sending request");
            let transport_request = TransportRequest {
                method: request.method,
                url: url.clone(),
                headers: headers.clone(),
                body: request.body.clone(),
                timeout: remaining,
            };

            let (error, retry_after) = match self.attempt(transport_request, remaining).await {
                Attempt::Done(result) => return (result, attempts),
                Attempt::Retry { error, retry_after } => (error, retry_after),
            };

            if !retry_safe || !self.retry.allows_another(attempts) {
                return (Err(error), attempts);
            }
            let delay = self.retry.delay_for(attempts - 1, retry_after);
            if Instant::now() + delay >= deadline {
                debug!(request_id, "retry would exceed the request budget");
                return (Err(error), attempts);
            }
            warn!(
                request_id,
                kind = %error.kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "transient failure, retrying"
            );
            last_error = Some(error);
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, request: TransportRequest, remaining: Duration) -> Attempt {
        match tokio::time::timeout(remaining, self.transport.send(request)).await {
            Ok(Ok(response)) if response.is_success() => {
                self.breaker.record_success();
                Attempt::Done(Ok(response.body))
            }
            Ok(Ok(response)) => {
                let error = error_from_response(&response);
                if self.retry.is_retryable_status(response.status) {
                    self.breaker.record_failure();
                    Attempt::Retry {
                        error,
                        retry_after: response.retry_after(),
                    }
                } else {
                    Attempt::Done(Err(error))
                }
            }
            Ok(Err(error)) => {
                self.breaker.record_failure();
                Attempt::Retry {
                    error: error.into(),
                    retry_after: None,
                }
            }
            Err(_) => {
                self.breaker.record_failure();
                Attempt::Retry {
                    error: ApiError::network("request timed out"),
                    retry_after: None,
                }
            }
        }
    }

    fn headers(&self, request: &ApiRequest, request_id: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            (REQUEST_ID_HEADER.to_string(), request_id.to_string()),
        ];
        if request.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        let token = match &request.auth {
            RequestAuth::Session => self.tokens.as_ref().and_then(|source| source.access_token()),
            RequestAuth::Bearer(token) => Some(token.clone()),
            RequestAuth::Anonymous => None,
        };
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers.extend(request.headers.iter().cloned());
        headers
    }

    fn envelope<T>(
        &self,
        result: Result<T, ApiError>,
        request_id: String,
        started: Instant,
        attempts: u32,
    ) -> ApiResponse<T> {
        let metadata = ResponseMetadata {
            timestamp: self.clock.now(),
            request_id,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            attempts,
        };
        match result {
            Ok(data) => ApiResponse::ok(data, metadata),
            Err(error) => ApiResponse::failed(error, metadata),
        }
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .field("default_timeout", &self.default_timeout)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("unexpected response body: {e}")))
}

/// Builds the error for a non-2xx response, reading `{message, code}` or
/// `{error: {message, code}}` bodies when present.
fn error_from_response(response: &TransportResponse) -> ApiError {
    let body: Option<Value> = serde_json::from_slice(&response.body).ok();
    let detail = body
        .as_ref()
        .map(|value| value.get("error").filter(|e| e.is_object()).unwrap_or(value));

    let message = detail
        .and_then(|d| d.get("message").or_else(|| d.get("detail")))
        .and_then(Value::as_str)
        .or_else(|| body.as_ref().and_then(|b| b.get("error")).and_then(Value::as_str))
        .map_or_else(|| format!("HTTP {}", response.status), str::to_string);

    let error = ApiError::from_status(response.status, message);
    match detail.and_then(|d| d.get("code")).and_then(Value::as_str) {
        Some(code) => error.with_code(code),
        None => error,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, ScriptedTransport, StaticTokenSource};
    use cosmos_domain::{BreakerPolicy, CircuitState, ErrorKind, HttpMethod};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
        executor: RequestExecutor,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::default());
        let breaker = Arc::new(CircuitBreaker::new(
            BreakerPolicy::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let executor = RequestExecutor::new(
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            breaker,
            RetryPolicy::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Url::parse("https://cosmos.example.com").unwrap(),
            Duration::from_secs(30),
        );
        Fixture {
            transport,
            clock,
            executor,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_503_retried_twice_then_succeeds() {
        let f = fixture();
        f.transport.push_status(503);
        f.transport.push_status(503);
        f.transport.push_json(200, json!({"id": "ds-1"}));

        let started = Instant::now();
        let response: ApiResponse<Value> = f
            .executor
            .request(ApiRequest::get("/api/v1/datasets/ds-1").timeout(Duration::from_secs(5)))
            .await;

        assert!(response.success);
        assert_eq!(response.error, None);
        assert_eq!(response.data.unwrap()["id"], "ds-1");
        assert_eq!(response.metadata.attempts, 3);
        assert_eq!(f.transport.calls(), 3);
        // 1s then 2s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_and_fails_fast() {
        let f = fixture();
        for _ in 0..5 {
            f.transport.push_status(500);
        }
        for _ in 0..5 {
            let response: ApiResponse<Value> = f
                .executor
                .request(ApiRequest::post("/api/v1/generation/requests"))
                .await;
            assert_eq!(response.error.unwrap().kind, ErrorKind::Server);
        }
        assert_eq!(f.executor.breaker().state(), CircuitState::Open);

        let response: ApiResponse<Value> =
            f.executor.request(ApiRequest::get("/api/v1/models")).await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::CircuitOpen);
        assert_eq!(response.metadata.attempts, 0);
        assert_eq!(f.transport.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_admitted_after_reset_timeout_and_closes() {
        let f = fixture();
        for _ in 0..5 {
            f.transport.push_status(502);
            let _: ApiResponse<Value> = f.executor.request(ApiRequest::post("/x")).await;
        }
        f.clock.advance(chrono::Duration::seconds(60));

        for _ in 0..3 {
            f.transport.push_json(200, json!({}));
            let response: ApiResponse<Value> = f.executor.request(ApiRequest::get("/x")).await;
            assert!(response.success);
        }
        let snapshot = f.executor.breaker().snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_is_not_retried() {
        let f = fixture();
        f.transport.push_status(503);
        f.transport.push_json(200, json!({}));
        let response: ApiResponse<Value> = f.executor.request(ApiRequest::post("/x")).await;
        assert!(!response.success);
        assert_eq!(f.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_at_budget() {
        let f = fixture();
        for _ in 0..4 {
            f.transport.push_status(503);
        }
        let response: ApiResponse<Value> = f
            .executor
            .request(ApiRequest::get("/x").timeout(Duration::from_millis(2_500)))
            .await;
        assert_eq!(response.error.unwrap().status, Some(503));
        // first retry after 1s fits, the second (2s more) would not
        assert_eq!(f.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_capped_at_max() {
        let f = fixture();
        for _ in 0..10 {
            f.transport.push_status(504);
        }
        let response: ApiResponse<Value> = f
            .executor
            .request(ApiRequest::get("/x").timeout(Duration::from_secs(60)))
            .await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().status, Some(504));
        assert_eq!(response.metadata.attempts, 3);
        assert_eq!(f.transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_honoured() {
        let f = fixture();
        f.transport
            .push(TransportResponse::empty(429).with_header("Retry-After", "3"));
        f.transport.push_json(200, json!(1));
        let started = Instant::now();
        let response: ApiResponse<u32> = f.executor.request(ApiRequest::get("/x")).await;
        assert_eq!(response.data, Some(1));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_neither_trip_nor_heal() {
        let f = fixture();
        for _ in 0..4 {
            f.transport.push_status(500);
            let _: ApiResponse<Value> = f.executor.request(ApiRequest::post("/x")).await;
        }
        for _ in 0..3 {
            f.transport.push_json(422, json!({"message": "bad", "code": "E_BAD"}));
            let response: ApiResponse<Value> = f.executor.request(ApiRequest::get("/x")).await;
            let error = response.error.unwrap();
            assert_eq!(error.kind, ErrorKind::Validation);
            assert_eq!(error.code.as_deref(), Some("E_BAD"));
        }
        assert_eq!(f.executor.breaker().snapshot().consecutive_failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried() {
        let f = fixture();
        f.transport.push_error(crate::ports::TransportError::Connect("refused".into()));
        f.transport.push_json(200, json!("ok"));
        let response: ApiResponse<String> = f.executor.request(ApiRequest::get("/x")).await;
        assert_eq!(response.data.as_deref(), Some("ok"));
        assert_eq!(response.metadata.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attaches_request_id_and_bearer() {
        let f = fixture();
        let executor = f
            .executor
            .with_token_source(Arc::new(StaticTokenSource::new("session-token")));
        f.transport.push_json(200, json!(null));
        let response: ApiResponse<()> = executor.request(ApiRequest::delete("/api/v1/datasets/1")).await;
        assert!(response.success);

        let sent = f.transport.requests();
        let sent = sent.first().unwrap();
        assert_eq!(sent.method, HttpMethod::Delete);
        assert_eq!(sent.header("authorization"), Some("Bearer session-token"));
        assert_eq!(sent.header("x-request-id"), Some(response.metadata.request_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_bearer_and_anonymous() {
        let f = fixture();
        let executor = f
            .executor
            .with_token_source(Arc::new(StaticTokenSource::new("session-token")));
        f.transport.push_json(200, json!(null));
        f.transport.push_json(200, json!(null));
        let _: ApiResponse<()> = executor.request(ApiRequest::get("/a").bearer("other")).await;
        let _: ApiResponse<()> = executor.request(ApiRequest::get("/b").anonymous()).await;

        let sent = f.transport.requests();
        assert_eq!(sent[0].header("authorization"), Some("Bearer other"));
        assert_eq!(sent[1].header("authorization"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_body_decodes_as_unit() {
        let f = fixture();
        f.transport.push_status(204);
        let response: ApiResponse<()> = f.executor.request(ApiRequest::delete("/x")).await;
        assert!(response.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_error_body() {
        let f = fixture();
        f.transport
            .push_json(403, json!({"error": {"message": "no access", "code": "FORBIDDEN"}}));
        let response: ApiResponse<Value> = f.executor.request(ApiRequest::get("/x")).await;
        let error = response.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Permission);
        assert_eq!(error.message, "no access");
        assert_eq!(error.code.as_deref(), Some("FORBIDDEN"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let f = fixture();
        f.transport.push_delayed(Duration::from_secs(10), TransportResponse::empty(200));
        let response: ApiResponse<()> = f
            .executor
            .request(ApiRequest::post("/x").timeout(Duration::from_secs(2)))
            .await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::Network);
        assert_eq!(f.executor.breaker().snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        let error = error_from_response(&TransportResponse::empty(500));
        assert_eq!(error.message, "HTTP 500");
        assert_eq!(error.kind, ErrorKind::Server);
    }
}
