//! HTTP transport implementation using reqwest.
//!
//! This adapter implements the `HttpTransport` port. Retries, the circuit
//! breaker and envelope building live in the application's executor; this
//! type only moves bytes.

use async_trait::async_trait;
use cosmos_application::ports::{
    HttpTransport, TransportError, TransportRequest, TransportResponse,
};
use cosmos_domain::{ApiSettings, HttpMethod};
use reqwest::{Client, Method};
use tracing::trace;

/// HTTP transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport configured from the API settings.
    ///
    /// Redirects are limited to 10 and TLS verification stays enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(settings: &ApiSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a transport with a custom reqwest client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Converts domain `HttpMethod` to reqwest `Method`.
    const fn to_reqwest_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
        }
    }

    /// Maps reqwest errors to `TransportError`.
    fn map_error(error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout;
        }

        if error.is_connect() {
            let message = error.to_string();
            let lowered = message.to_lowercase();
            let host = error
                .url()
                .and_then(|u| u.host_str().map(ToString::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            if lowered.contains("dns") || lowered.contains("resolve") {
                return TransportError::Dns(format!("{host}: {message}"));
            }
            if lowered.contains("refused") {
                return TransportError::Connect(format!("connection refused by {host}"));
            }
            return TransportError::Connect(message);
        }

        if error.is_redirect() {
            return TransportError::Request("too many redirects (max 10)".to_string());
        }

        TransportError::Request(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        trace!(method = %request.method, url = %request.url, "sending");

        let mut builder = self
            .client
            .request(Self::to_reqwest_method(request.method), request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| TransportError::Request(format!("invalid JSON body: {e}")))?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(|e| Self::map_error(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(format!("failed to read body: {e}"))
                }
            })?
            .to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
