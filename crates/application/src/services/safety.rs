//! Guardrail configuration and safety events.

use cosmos_domain::{ApiRequest, ApiResponse, GuardrailConfig, SafetyEvent, api_path};

use crate::resilience::RequestExecutor;

/// Safety endpoints.
#[derive(Debug, Clone)]
pub struct SafetyService {
    executor: RequestExecutor,
}

impl SafetyService {
    /// Creates the service.
    #[must_use]
    pub const fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Current guardrail configuration.
    pub async fn guardrails(&self) -> ApiResponse<GuardrailConfig> {
        self.executor
            .request(ApiRequest::get(api_path(&["safety", "guardrails"])))
            .await
    }

    /// Replaces the guardrail configuration. Thresholds must lie in [0, 1].
    pub async fn update_guardrails(&self, config: &GuardrailConfig) -> ApiResponse<GuardrailConfig> {
        if let Err(error) = config.validate() {
            return self.executor.rejected(error.into());
        }
        self.executor
            .request_json(ApiRequest::put(api_path(&["safety", "guardrails"])), config)
            .await
    }

    /// Most recent guardrail decisions.
    pub async fn events(&self, limit: Option<u32>) -> ApiResponse<Vec<SafetyEvent>> {
        let mut request = ApiRequest::get(api_path(&["safety", "events"]));
        if let Some(limit) = limit {
            request = request.query("limit", limit);
        }
        self.executor.request(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, executor};
    use cosmos_domain::{ErrorKind, SafetyThresholds, Severity};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_update_rejects_out_of_range_threshold() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = SafetyService::new(executor(&transport));
        let config = GuardrailConfig {
            thresholds: SafetyThresholds {
                nsfw: 1.2,
                ..SafetyThresholds::default()
            },
            ..GuardrailConfig::default()
        };

        let response = service.update_guardrails(&config).await;

        assert_eq!(response.error.map(|e| e.kind), Some(ErrorKind::Validation));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_puts_config() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = SafetyService::new(executor(&transport));
        let config = GuardrailConfig {
            face_blur: true,
            blocked_terms: vec!["gore".into()],
            ..GuardrailConfig::default()
        };
        transport.push_json(200, serde_json::to_value(&config).unwrap());

        let saved = service.update_guardrails(&config).await.into_result().unwrap();

        assert_eq!(saved, config);
        let sent = &transport.requests()[0];
        assert_eq!(sent.body.as_ref().unwrap()["faceBlur"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_with_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = SafetyService::new(executor(&transport));
        transport.push_json(
            200,
            json!([{
                "id": "s-1",
                "category": "violence",
                "severity": "high",
                "message": "prompt blocked",
                "occurredAt": "2025-01-01T00:00:00Z"
            }]),
        );

        let events = service.events(Some(20)).await.into_result().unwrap();

        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(transport.requests()[0].url.query(), Some("limit=20"));
    }
}
