//! WebSocket implementation of the push channel.
//!
//! Each `connect` opens one socket; the returned stream yields parsed
//! [`MonitorEvent`]s and ends when the server closes. Reconnecting is the
//! monitor's job.

use std::sync::Arc;

use async_trait::async_trait;
use cosmos_application::ports::{AccessTokenSource, EventStream, MonitorError, PushChannel};
use cosmos_domain::{MonitorEvent, MonitorSettings};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, trace};

/// Push channel over `tokio-tungstenite`.
#[derive(Clone, Default)]
pub struct WebSocketChannel {
    url: Option<String>,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl WebSocketChannel {
    /// Creates a channel for the configured URL. Without one, every
    /// connect fails with [`MonitorError::NotConfigured`].
    #[must_use]
    pub fn new(settings: &MonitorSettings) -> Self {
        Self {
            url: settings.ws_url.clone(),
            tokens: None,
        }
    }

    /// Sends the session's bearer token with the handshake.
    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

fn parse(message: Message) -> Option<Result<MonitorEvent, MonitorError>> {
    let text = match message {
        Message::Text(text) => text,
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => return Some(Err(MonitorError::Protocol(e.to_string()))),
        },
        Message::Close(frame) => {
            debug!(?frame, "push channel closed by server");
            return None;
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return None,
    };
    trace!(%text, "push message");
    Some(MonitorEvent::from_json(&text).map_err(|e| MonitorError::Protocol(e.to_string())))
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn connect(&self) -> Result<EventStream, MonitorError> {
        let url = self.url.as_deref().ok_or(MonitorError::NotConfigured)?;
        let mut request = url
            .into_client_request()
            .map_err(|e| MonitorError::Connect(e.to_string()))?;

        if let Some(token) = self.tokens.as_ref().and_then(|source| source.access_token()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| MonitorError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, response) = connect_async(request)
            .await
            .map_err(|e| MonitorError::Connect(e.to_string()))?;
        debug!(%url, status = response.status().as_u16(), "push channel connected");

        let events = socket.filter_map(|message| async move {
            match message {
                Ok(message) => parse(message),
                Err(e) => Some(Err(MonitorError::Connect(e.to_string()))),
            }
        });
        Ok(events.boxed())
    }
}

impl std::fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("url", &self.url)
            .field("authenticated", &self.tokens.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cosmos_application::test_support::StaticTokenSource;
    use cosmos_domain::{Severity, TrainingStatus};
    use futures_util::SinkExt;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    /// Serves one connection that sends `frames` and closes, reporting the
    /// handshake's Authorization header.
    async fn serve_once(frames: Vec<Message>) -> (String, oneshot::Receiver<Option<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (header_tx, header_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let header = request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string);
                let _ = header_tx.send(header);
                Ok(response)
            };
            let mut socket = accept_hdr_async(stream, callback).await.unwrap();
            for frame in frames {
                socket.send(frame).await.unwrap();
            }
            let _ = socket.close(None).await;
        });

        (url, header_rx)
    }

    fn settings(url: &str) -> MonitorSettings {
        MonitorSettings {
            ws_url: Some(url.to_string()),
            ..MonitorSettings::default()
        }
    }

    #[tokio::test]
    async fn test_streams_events_until_close() {
        let (url, header) = serve_once(vec![
            Message::Text(
                r#"{"type":"training_progress","jobId":"t-1","status":"running","progress":10}"#
                    .into(),
            ),
            Message::Ping(vec![1]),
            Message::Text(r#"{"type":"unknown"}"#.into()),
            Message::Binary(
                br#"{"type":"safety_alert","category":"nsfw","severity":"high","message":"x"}"#
                    .to_vec(),
            ),
        ])
        .await;

        let channel = WebSocketChannel::new(&settings(&url))
            .with_token_source(Arc::new(StaticTokenSource::new("tok-1")));
        let events: Vec<_> = channel.connect().await.unwrap().collect().await;

        assert_eq!(header.await.unwrap().as_deref(), Some("Bearer tok-1"));
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            Ok(MonitorEvent::TrainingProgress {
                job_id: "t-1".into(),
                status: TrainingStatus::Running,
                progress: 10.0,
                loss: None,
            })
        );
        assert!(matches!(events[1], Err(MonitorError::Protocol(_))));
        assert!(matches!(
            events[2],
            Ok(MonitorEvent::SafetyAlert {
                severity: Severity::High,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_anonymous_handshake() {
        let (url, header) = serve_once(Vec::new()).await;
        let channel = WebSocketChannel::new(&settings(&url));
        let events: Vec<_> = channel.connect().await.unwrap().collect().await;
        assert!(events.is_empty());
        assert_eq!(header.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let channel = WebSocketChannel::new(&MonitorSettings::default());
        assert!(matches!(channel.connect().await, Err(MonitorError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let channel = WebSocketChannel::new(&settings(&url));
        assert!(matches!(channel.connect().await, Err(MonitorError::Connect(_))));
    }
}
