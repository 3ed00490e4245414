//! Derived views over [`AppState`].

use cosmos_domain::{
    ApiError, Dataset, DatasetStatus, GenerationJob, Model, SessionPhase, Severity, TrainingJob,
    User,
};

use super::state::{AppState, SafetyAlert};

/// Whether a user is signed in.
#[must_use]
pub fn is_authenticated(state: &AppState) -> bool {
    state.auth.phase == SessionPhase::Authenticated
}

/// Whether a second factor is awaited.
#[must_use]
pub fn is_mfa_pending(state: &AppState) -> bool {
    state.auth.phase == SessionPhase::MfaPending
}

/// The signed-in user.
#[must_use]
pub fn current_user(state: &AppState) -> Option<&User> {
    state.auth.user.as_ref()
}

/// Whether the signed-in user holds `permission`.
#[must_use]
pub fn can(state: &AppState, permission: &str) -> bool {
    current_user(state).is_some_and(|user| user.has_permission(permission))
}

/// Datasets on the current page in the given state.
#[must_use]
pub fn datasets_with_status(state: &AppState, status: DatasetStatus) -> Vec<&Dataset> {
    state
        .datasets
        .items
        .iter()
        .filter(|dataset| dataset.status == status)
        .collect()
}

/// The active model.
#[must_use]
pub fn selected_model(state: &AppState) -> Option<&Model> {
    state.models.items.iter().find(|model| model.selected)
}

/// Training jobs that can still change.
#[must_use]
pub fn active_training_jobs(state: &AppState) -> Vec<&TrainingJob> {
    state
        .training
        .jobs
        .iter()
        .filter(|job| !job.status.is_terminal())
        .collect()
}

/// Most recent loss reported for a job.
#[must_use]
pub fn latest_loss(state: &AppState, job_id: &str) -> Option<f64> {
    state
        .training
        .metrics
        .get(job_id)
        .and_then(cosmos_domain::TrainingMetrics::latest_loss)
}

/// Generation jobs still rendering.
#[must_use]
pub fn pending_generations(state: &AppState) -> Vec<&GenerationJob> {
    state
        .generation
        .jobs
        .iter()
        .filter(|job| !job.status.is_terminal())
        .collect()
}

/// Alerts at or above `severity`.
#[must_use]
pub fn alerts_at_least(state: &AppState, severity: Severity) -> Vec<&SafetyAlert> {
    state
        .safety
        .alerts
        .iter()
        .filter(|alert| alert.severity >= severity)
        .collect()
}

/// Whether any slice has a request in flight.
#[must_use]
pub const fn is_loading(state: &AppState) -> bool {
    state.auth.loading
        || state.datasets.loading
        || state.models.loading
        || state.training.loading
        || state.safety.loading
        || state.generation.loading
}

/// Every slice error, for an alert banner.
#[must_use]
pub fn errors(state: &AppState) -> Vec<&ApiError> {
    [
        &state.auth.error,
        &state.datasets.error,
        &state.models.error,
        &state.training.error,
        &state.safety.error,
        &state.generation.error,
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Action;
    use cosmos_domain::{GenerationStatus, MetricPoint, MonitorEvent, TrainingMetrics, TrainingStatus};
    use pretty_assertions::assert_eq;

    fn generation(id: &str, status: GenerationStatus) -> GenerationJob {
        GenerationJob {
            id: id.into(),
            status,
            progress: 0.0,
            output_url: None,
            error: None,
            created_at: None,
        }
    }

    #[test]
    fn test_pending_generations() {
        let mut state = AppState::default();
        state.reduce(Action::GenerationUpdated(generation("a", GenerationStatus::Processing)));
        state.reduce(Action::GenerationUpdated(generation("b", GenerationStatus::Blocked)));
        let pending: Vec<_> = pending_generations(&state).iter().map(|j| j.id.as_str()).collect();
        assert_eq!(pending, vec!["a"]);
    }

    #[test]
    fn test_latest_loss_and_errors() {
        let mut state = AppState::default();
        state.reduce(Action::TrainingMetricsLoaded(TrainingMetrics {
            job_id: "t-1".into(),
            points: vec![MetricPoint {
                step: 1,
                loss: 0.5,
                val_loss: None,
                learning_rate: None,
            }],
        }));
        state.reduce(Action::ModelsFailed(ApiError::network("offline")));

        assert_eq!(latest_loss(&state, "t-1"), Some(0.5));
        assert_eq!(latest_loss(&state, "t-2"), None);
        assert_eq!(errors(&state).len(), 1);
        assert!(!is_loading(&state));
    }

    #[test]
    fn test_alert_severity_filter() {
        let mut state = AppState::default();
        for severity in [Severity::Low, Severity::High, Severity::Critical] {
            state.reduce(Action::Monitor(MonitorEvent::SafetyAlert {
                category: "hate".into(),
                severity,
                message: String::new(),
            }));
        }
        assert_eq!(alerts_at_least(&state, Severity::High).len(), 2);
        assert!(active_training_jobs(&state).is_empty());
        assert!(!TrainingStatus::Running.is_terminal());
    }
}
