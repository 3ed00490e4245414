//! Training jobs.

use std::time::Duration;

use cosmos_domain::{
    ApiRequest, ApiResponse, TrainingConfig, TrainingJob, TrainingMetrics, api_path,
};

use super::watch_until;
use crate::polling::Watch;
use crate::resilience::RequestExecutor;

/// Training job endpoints.
#[derive(Debug, Clone)]
pub struct TrainingService {
    executor: RequestExecutor,
}

impl TrainingService {
    /// Creates the service.
    #[must_use]
    pub const fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Lists jobs, newest first as ordered by the server.
    pub async fn list_jobs(&self) -> ApiResponse<Vec<TrainingJob>> {
        self.executor
            .request(ApiRequest::get(api_path(&["training", "jobs"])))
            .await
    }

    /// Fetches one job.
    pub async fn get_job(&self, id: &str) -> ApiResponse<TrainingJob> {
        self.executor
            .request(ApiRequest::get(api_path(&["training", "jobs", id])))
            .await
    }

    /// Submits a job after checking the configuration.
    pub async fn create_job(&self, config: &TrainingConfig) -> ApiResponse<TrainingJob> {
        if let Err(error) = config.validate() {
            return self.executor.rejected(error.into());
        }
        self.executor
            .request_json(ApiRequest::post(api_path(&["training", "jobs"])), config)
            .await
    }

    /// Cancels a job.
    pub async fn cancel_job(&self, id: &str) -> ApiResponse<TrainingJob> {
        self.executor
            .request(ApiRequest::post(api_path(&["training", "jobs", id, "cancel"])))
            .await
    }

    /// Loss history of a job.
    pub async fn metrics(&self, id: &str) -> ApiResponse<TrainingMetrics> {
        self.executor
            .request(ApiRequest::get(api_path(&["training", "jobs", id, "metrics"])))
            .await
    }

    /// Polls a job every `interval` until it reaches a terminal status.
    #[must_use]
    pub fn watch_job(&self, id: &str, interval: Duration) -> Watch<TrainingJob> {
        let service = self.clone();
        let id = id.to_string();
        watch_until(
            interval,
            move || {
                let service = service.clone();
                let id = id.clone();
                async move { service.get_job(&id).await }
            },
            |job: &TrainingJob| job.status.is_terminal(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, executor};
    use cosmos_domain::{ErrorKind, TrainingStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> TrainingConfig {
        TrainingConfig {
            model_id: "m-1".into(),
            dataset_id: "d-1".into(),
            epochs: 3,
            learning_rate: 1e-4,
            batch_size: 8,
            use_lora: true,
        }
    }

    fn service() -> (Arc<ScriptedTransport>, TrainingService) {
        let transport = Arc::new(ScriptedTransport::new());
        let service = TrainingService::new(executor(&transport));
        (transport, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_job_validates_config() {
        let (transport, service) = service();
        for bad in [
            TrainingConfig { epochs: 0, ..config() },
            TrainingConfig { learning_rate: 0.0, ..config() },
            TrainingConfig { learning_rate: 1.5, ..config() },
            TrainingConfig { batch_size: 0, ..config() },
        ] {
            let response = service.create_job(&bad).await;
            assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::Validation));
        }
        assert_eq!(transport.calls(), 0);

        transport.push_json(201, json!({"id": "t-1", "status": "queued"}));
        let job = service.create_job(&config()).await.into_result().unwrap();
        assert_eq!(job.status, TrainingStatus::Queued);
        assert_eq!(transport.requests()[0].body.as_ref().unwrap()["useLora"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_not_retried() {
        let (transport, service) = service();
        transport.push_status(503);

        let response = service.cancel_job("t-1").await;

        assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::Server));
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.requests()[0].url.path(), "/api/v1/training/jobs/t-1/cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics() {
        let (transport, service) = service();
        transport.push_json(
            200,
            json!({"jobId": "t-1", "points": [{"step": 10, "loss": 0.9}, {"step": 20, "loss": 0.7}]}),
        );
        let metrics = service.metrics("t-1").await.into_result().unwrap();
        assert_eq!(metrics.latest_loss(), Some(0.7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_job_polls_until_terminal() {
        let (transport, service) = service();
        transport.push_json(200, json!({"id": "t-1", "status": "running", "progress": 10.0}));
        transport.push_json(200, json!({"id": "t-1", "status": "running", "progress": 60.0}));
        transport.push_json(200, json!({"id": "t-1", "status": "completed", "progress": 100.0}));

        let watch = service.watch_job("t-1", Duration::from_secs(5));
        let mut updates = watch.updates.clone();
        updates
            .wait_for(|job| job.as_ref().is_some_and(|j| j.status.is_terminal()))
            .await
            .unwrap();
        watch.handle.finished().await;

        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_job_survives_transient_errors_and_stops() {
        let (transport, service) = service();
        // one poll whose retries are all exhausted
        for _ in 0..4 {
            transport.push_status(503);
        }
        transport.push_json(200, json!({"id": "t-1", "status": "running", "progress": 30.0}));

        let watch = service.watch_job("t-1", Duration::from_secs(5));
        let mut updates = watch.updates.clone();
        updates.wait_for(Option::is_some).await.unwrap();
        assert_eq!(watch.latest().map(|j| j.progress), Some(30.0));

        watch.stop();
        let calls = transport.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls(), calls);
    }
}
