//! Video generation requests.

use std::time::Duration;

use cosmos_domain::{
    ApiRequest, ApiResponse, GenerationJob, GenerationRequest, api_path, generate_request_id,
};

use super::watch_until;
use crate::polling::Watch;
use crate::resilience::RequestExecutor;

/// Header letting the server deduplicate a resubmitted generation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Generation endpoints.
#[derive(Debug, Clone)]
pub struct GenerationService {
    executor: RequestExecutor,
}

impl GenerationService {
    /// Creates the service.
    #[must_use]
    pub const fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Submits a generation request.
    ///
    /// The submission carries an idempotency key, so transient failures are
    /// retried without risking a duplicate render.
    pub async fn submit(&self, request: &GenerationRequest) -> ApiResponse<GenerationJob> {
        if let Err(error) = request.validate() {
            return self.executor.rejected(error.into());
        }
        let api_request = ApiRequest::post(api_path(&["generation", "requests"]))
            .header(IDEMPOTENCY_KEY_HEADER, generate_request_id())
            .idempotent(true);
        self.executor.request_json(api_request, request).await
    }

    /// Current state of a request.
    pub async fn status(&self, id: &str) -> ApiResponse<GenerationJob> {
        self.executor
            .request(ApiRequest::get(api_path(&["generation", "requests", id])))
            .await
    }

    /// Cancels a request.
    pub async fn cancel(&self, id: &str) -> ApiResponse<GenerationJob> {
        self.executor
            .request(ApiRequest::post(api_path(&["generation", "requests", id, "cancel"])))
            .await
    }

    /// Polls a request every `interval` until it completes, fails, is
    /// cancelled or is blocked.
    #[must_use]
    pub fn track(&self, id: &str, interval: Duration) -> Watch<GenerationJob> {
        let service = self.clone();
        let id = id.to_string();
        watch_until(
            interval,
            move || {
                let service = service.clone();
                let id = id.clone();
                async move { service.status(&id).await }
            },
            |job: &GenerationJob| job.status.is_terminal(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, executor};
    use cosmos_domain::{ErrorKind, GenerationStatus, Resolution};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a robot crossing a busy street".into(),
            model_id: "m-1".into(),
            num_frames: 121,
            resolution: Resolution::default(),
            seed: Some(7),
            negative_prompt: None,
        }
    }

    fn service() -> (Arc<ScriptedTransport>, GenerationService) {
        let transport = Arc::new(ScriptedTransport::new());
        let service = GenerationService::new(executor(&transport));
        (transport, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_validates_locally() {
        let (transport, service) = service();
        let bad = [
            GenerationRequest {
                prompt: " ".into(),
                ..request()
            },
            GenerationRequest {
                num_frames: 0,
                ..request()
            },
            GenerationRequest {
                resolution: Resolution {
                    width: 333,
                    height: 333,
                },
                ..request()
            },
        ];
        for request in &bad {
            let response = service.submit(request).await;
            assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::Validation));
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_retries_with_one_idempotency_key() {
        let (transport, service) = service();
        transport.push_status(502);
        transport.push_json(202, json!({"id": "g-1", "status": "pending"}));

        let job = service.submit(&request()).await.into_result().unwrap();

        assert_eq!(job.status, GenerationStatus::Pending);
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let key = requests[0].header(IDEMPOTENCY_KEY_HEADER).unwrap();
        assert_eq!(requests[1].header(IDEMPOTENCY_KEY_HEADER), Some(key));
        assert_eq!(requests[0].body.as_ref().unwrap()["numFrames"], 121);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_stops_when_blocked() {
        let (transport, service) = service();
        transport.push_json(200, json!({"id": "g-1", "status": "processing", "progress": 40.0}));
        transport.push_json(
            200,
            json!({"id": "g-1", "status": "blocked", "error": "output filter"}),
        );

        let watch = service.track("g-1", Duration::from_secs(2));
        let mut updates = watch.updates.clone();
        updates
            .wait_for(|job| job.as_ref().is_some_and(|j| j.status.is_terminal()))
            .await
            .unwrap();

        assert_eq!(
            watch.latest().and_then(|job| job.error),
            Some("output filter".to_string())
        );
        watch.handle.finished().await;
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_stops_on_not_found() {
        let (transport, service) = service();
        transport.push_json(404, json!({"message": "unknown request"}));

        let watch = service.track("g-404", Duration::from_secs(2));
        watch.handle.finished().await;

        assert_eq!(transport.calls(), 1);
    }
}
