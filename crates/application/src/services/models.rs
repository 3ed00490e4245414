//! Model catalogue.

use cosmos_domain::{ApiRequest, ApiResponse, Model, ModelType, api_path};

use crate::resilience::RequestExecutor;

/// Model endpoints.
#[derive(Debug, Clone)]
pub struct ModelService {
    executor: RequestExecutor,
}

impl ModelService {
    /// Creates the service.
    #[must_use]
    pub const fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Lists models, optionally of one family.
    pub async fn list(&self, model_type: Option<ModelType>) -> ApiResponse<Vec<Model>> {
        let mut request = ApiRequest::get(api_path(&["models"]));
        if let Some(model_type) = model_type {
            request = request.query("type", model_type.as_str());
        }
        self.executor.request(request).await
    }

    /// Fetches one model.
    pub async fn get(&self, id: &str) -> ApiResponse<Model> {
        self.executor
            .request(ApiRequest::get(api_path(&["models", id])))
            .await
    }

    /// Makes a model the active one. Selecting twice has the same effect
    /// as once, so the call is retried like a read.
    pub async fn select(&self, id: &str) -> ApiResponse<Model> {
        self.executor
            .request(ApiRequest::post(api_path(&["models", id, "select"])).idempotent(true))
            .await
    }
}
