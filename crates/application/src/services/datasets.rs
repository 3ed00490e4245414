//! Dataset catalogue and curation.

use cosmos_domain::{
    ApiRequest, ApiResponse, CurationFilters, CurationJob, Dataset, DatasetDraft, DatasetQuery,
    Page, api_path,
};

use crate::resilience::RequestExecutor;

/// Dataset endpoints.
#[derive(Debug, Clone)]
pub struct DatasetService {
    executor: RequestExecutor,
}

impl DatasetService {
    /// Creates the service.
    #[must_use]
    pub const fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Lists datasets page by page.
    pub async fn list(&self, query: &DatasetQuery) -> ApiResponse<Page<Dataset>> {
        let mut request = ApiRequest::get(api_path(&["datasets"]));
        request.query = query.to_pairs();
        self.executor.request(request).await
    }

    /// Fetches one dataset.
    pub async fn get(&self, id: &str) -> ApiResponse<Dataset> {
        self.executor
            .request(ApiRequest::get(api_path(&["datasets", id])))
            .await
    }

    /// Creates a dataset.
    pub async fn create(&self, draft: &DatasetDraft) -> ApiResponse<Dataset> {
        if let Err(error) = draft.validate() {
            return self.executor.rejected(error.into());
        }
        self.executor
            .request_json(ApiRequest::post(api_path(&["datasets"])), draft)
            .await
    }

    /// Replaces a dataset's editable fields.
    pub async fn update(&self, id: &str, draft: &DatasetDraft) -> ApiResponse<Dataset> {
        if let Err(error) = draft.validate() {
            return self.executor.rejected(error.into());
        }
        self.executor
            .request_json(ApiRequest::put(api_path(&["datasets", id])), draft)
            .await
    }

    /// Deletes a dataset.
    pub async fn delete(&self, id: &str) -> ApiResponse<()> {
        self.executor
            .request(ApiRequest::delete(api_path(&["datasets", id])))
            .await
    }

    /// Starts a curation job over a dataset.
    pub async fn curate(&self, id: &str, filters: &CurationFilters) -> ApiResponse<CurationJob> {
        if let Err(error) = filters.validate() {
            return self.executor.rejected(error.into());
        }
        self.executor
            .request_json(ApiRequest::post(api_path(&["datasets", id, "curate"])), filters)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, executor};
    use cosmos_domain::{DatasetStatus, ErrorKind, HttpMethod};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> (Arc<ScriptedTransport>, DatasetService) {
        let transport = Arc::new(ScriptedTransport::new());
        let service = DatasetService::new(executor(&transport));
        (transport, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_sends_query_and_decodes_page() {
        let (transport, service) = service();
        transport.push_json(
            200,
            json!({
                "items": [{"id": "d-1", "name": "driving", "status": "ready", "videoCount": 12}],
                "total": 31,
                "page": 2,
                "pageSize": 10
            }),
        );

        let query = DatasetQuery {
            page: Some(2),
            page_size: Some(10),
            search: Some("driv".into()),
            status: Some(DatasetStatus::Ready),
        };
        let page = service.list(&query).await.into_result().unwrap();

        assert_eq!(page.items[0].video_count, 12);
        assert!(page.has_more());
        let sent = &transport.requests()[0];
        assert_eq!(sent.url.path(), "/api/v1/datasets");
        assert_eq!(
            sent.url.query(),
            Some("page=2&pageSize=10&search=driv&status=ready")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_cannot_escape_the_dataset_path() {
        let (transport, service) = service();
        transport.push_json(404, json!({"message": "no such dataset"}));
        let response = service.delete("../../auth/logout").await;
        assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::NotFound));
        assert_eq!(
            transport.requests()[0].url.path(),
            "/api/v1/datasets/..%2F..%2Fauth%2Flogout"
        );

        let response = service.get("..").await;
        assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::Validation));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_invalid_draft_locally() {
        let (transport, service) = service();
        let response = service.create(&DatasetDraft::named("  ")).await;

        assert!(!response.success);
        assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::Validation));
        assert_eq!(response.metadata.attempts, 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_and_delete() {
        let (transport, service) = service();
        transport.push_json(200, json!({"id": "d-1", "name": "renamed"}));
        transport.push_status(204);

        let updated = service
            .update("d-1", &DatasetDraft::named("renamed"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(service.delete("d-1").await.success);

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[0].body.as_ref().unwrap()["name"], "renamed");
        assert_eq!(requests[1].method, HttpMethod::Delete);
        assert_eq!(requests[1].url.path(), "/api/v1/datasets/d-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_curate_posts_filters() {
        let (transport, service) = service();
        transport.push_json(
            202,
            json!({"jobId": "c-1", "datasetId": "d-1", "status": "queued"}),
        );

        let filters = CurationFilters {
            min_quality: Some(0.4),
            ..CurationFilters::default()
        };
        let job = service.curate("d-1", &filters).await.into_result().unwrap();

        assert_eq!(job.job_id, "c-1");
        let sent = &transport.requests()[0];
        assert_eq!(sent.url.path(), "/api/v1/datasets/d-1/curate");
        assert_eq!(sent.body.as_ref().unwrap()["minQuality"], 0.4);
        assert_eq!(sent.body.as_ref().unwrap()["deduplicate"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_curate_rejects_bad_quality() {
        let (transport, service) = service();
        let filters = CurationFilters {
            min_quality: Some(1.5),
            ..CurationFilters::default()
        };
        assert!(!service.curate("d-1", &filters).await.success);
        assert_eq!(transport.calls(), 0);
    }
}
