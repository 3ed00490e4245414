//! Application state and its reducer.

use std::collections::HashMap;

use cosmos_domain::{
    ApiError, ConnectionState, Dataset, GenerationJob, GuardrailConfig, Model, MonitorEvent,
    Page, SafetyEvent, Session, SessionPhase, Severity, TrainingJob, TrainingMetrics, User,
};

use super::action::Action;

/// Safety alerts kept for display.
pub const MAX_ALERTS: usize = 50;

/// Signed-in user as seen by the UI. Tokens never enter the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    /// Session phase.
    pub phase: SessionPhase,
    /// Signed-in user.
    pub user: Option<User>,
    /// A login step is in flight.
    pub loading: bool,
    /// Last login failure.
    pub error: Option<ApiError>,
}

/// Dataset listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetsState {
    /// Datasets on the current page.
    pub items: Vec<Dataset>,
    /// Total across pages.
    pub total: u64,
    /// Current page.
    pub page: u32,
    /// A request is in flight.
    pub loading: bool,
    /// Last failure.
    pub error: Option<ApiError>,
}

/// Model catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelsState {
    /// Known models.
    pub items: Vec<Model>,
    /// A request is in flight.
    pub loading: bool,
    /// Last failure.
    pub error: Option<ApiError>,
}

/// Training jobs and their metrics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingState {
    /// Known jobs.
    pub jobs: Vec<TrainingJob>,
    /// Metrics by job id.
    pub metrics: HashMap<String, TrainingMetrics>,
    /// A request is in flight.
    pub loading: bool,
    /// Last failure.
    pub error: Option<ApiError>,
}

/// A pushed guardrail alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyAlert {
    /// Category that fired.
    pub category: String,
    /// Severity.
    pub severity: Severity,
    /// Description.
    pub message: String,
}

/// Guardrails, logged events and live alerts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SafetyState {
    /// Current guardrail configuration, once loaded.
    pub guardrails: Option<GuardrailConfig>,
    /// Logged events.
    pub events: Vec<SafetyEvent>,
    /// Pushed alerts, newest first.
    pub alerts: Vec<SafetyAlert>,
    /// A request is in flight.
    pub loading: bool,
    /// Last failure.
    pub error: Option<ApiError>,
}

/// Generation requests submitted in this session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationState {
    /// Jobs, in submission order.
    pub jobs: Vec<GenerationJob>,
    /// A request is in flight.
    pub loading: bool,
    /// Last failure.
    pub error: Option<ApiError>,
}

/// Everything the UI renders from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    /// Session slice.
    pub auth: AuthState,
    /// Dataset slice.
    pub datasets: DatasetsState,
    /// Model slice.
    pub models: ModelsState,
    /// Training slice.
    pub training: TrainingState,
    /// Safety slice.
    pub safety: SafetyState,
    /// Generation slice.
    pub generation: GenerationState,
    /// Push channel state.
    pub connection: ConnectionState,
}

impl AppState {
    /// Applies one action.
    #[allow(clippy::too_many_lines)]
    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::SessionChanged(session) => self.apply_session(&session),
            Action::AuthRequested => {
                self.auth.loading = true;
                self.auth.error = None;
            }
            Action::AuthFailed(error) => {
                self.auth.loading = false;
                self.auth.error = Some(error);
            }

            Action::DatasetsRequested => {
                self.datasets.loading = true;
                self.datasets.error = None;
            }
            Action::DatasetsLoaded(page) => self.apply_dataset_page(page),
            Action::DatasetSaved(dataset) => {
                self.datasets.loading = false;
                upsert(&mut self.datasets.items, dataset, |d| &d.id);
            }
            Action::DatasetDeleted(id) => {
                self.datasets.loading = false;
                let before = self.datasets.items.len();
                self.datasets.items.retain(|d| d.id != id);
                if self.datasets.items.len() < before {
                    self.datasets.total = self.datasets.total.saturating_sub(1);
                }
            }
            Action::DatasetsFailed(error) => {
                self.datasets.loading = false;
                self.datasets.error = Some(error);
            }

            Action::ModelsRequested => {
                self.models.loading = true;
                self.models.error = None;
            }
            Action::ModelsLoaded(models) => {
                self.models.loading = false;
                self.models.items = models;
            }
            Action::ModelSelected(id) => {
                self.models.loading = false;
                for model in &mut self.models.items {
                    model.selected = model.id == id;
                }
            }
            Action::ModelsFailed(error) => {
                self.models.loading = false;
                self.models.error = Some(error);
            }

            Action::TrainingRequested => {
                self.training.loading = true;
                self.training.error = None;
            }
            Action::TrainingJobsLoaded(jobs) => {
                self.training.loading = false;
                self.training.jobs = jobs;
            }
            Action::TrainingJobUpdated(job) => {
                self.training.loading = false;
                upsert(&mut self.training.jobs, job, |j| &j.id);
            }
            Action::TrainingMetricsLoaded(metrics) => {
                self.training.loading = false;
                self.training.metrics.insert(metrics.job_id.clone(), metrics);
            }
            Action::TrainingFailed(error) => {
                self.training.loading = false;
                self.training.error = Some(error);
            }

            Action::SafetyRequested => {
                self.safety.loading = true;
                self.safety.error = None;
            }
            Action::GuardrailsLoaded(config) => {
                self.safety.loading = false;
                self.safety.guardrails = Some(config);
            }
            Action::SafetyEventsLoaded(events) => {
                self.safety.loading = false;
                self.safety.events = events;
            }
            Action::SafetyFailed(error) => {
                self.safety.loading = false;
                self.safety.error = Some(error);
            }

            Action::GenerationRequested => {
                self.generation.loading = true;
                self.generation.error = None;
            }
            Action::GenerationUpdated(job) => {
                self.generation.loading = false;
                upsert(&mut self.generation.jobs, job, |j| &j.id);
            }
            Action::GenerationFailed(error) => {
                self.generation.loading = false;
                self.generation.error = Some(error);
            }

            Action::Monitor(event) => self.apply_monitor_event(event),
            Action::ConnectionChanged(state) => self.connection = state,
            Action::Reset => *self = Self::default(),
        }
    }

    fn apply_session(&mut self, session: &Session) {
        let phase = session.phase();
        if phase == SessionPhase::Unauthenticated && self.auth.phase == SessionPhase::Authenticated
        {
            // signed out: drop everything fetched under the old session
            let connection = self.connection;
            let error = self.auth.error.take();
            *self = Self {
                connection,
                ..Self::default()
            };
            self.auth.error = error;
            return;
        }
        self.auth.phase = phase;
        self.auth.user = session.user.clone().filter(|_| session.authenticated);
        self.auth.loading = false;
        if phase == SessionPhase::Authenticated {
            self.auth.error = None;
        }
    }

    fn apply_dataset_page(&mut self, page: Page<Dataset>) {
        self.datasets.loading = false;
        self.datasets.total = page.total;
        self.datasets.page = page.page;
        self.datasets.items = page.items;
    }

    fn apply_monitor_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::DatasetUpdated { dataset_id, status } => {
                if let Some(dataset) = self.datasets.items.iter_mut().find(|d| d.id == dataset_id) {
                    dataset.status = status;
                }
            }
            MonitorEvent::TrainingProgress {
                job_id,
                status,
                progress,
                ..
            } => {
                if let Some(job) = self.training.jobs.iter_mut().find(|j| j.id == job_id) {
                    job.status = status;
                    job.progress = progress;
                }
            }
            MonitorEvent::GenerationProgress {
                request_id,
                status,
                progress,
            } => {
                if let Some(job) = self.generation.jobs.iter_mut().find(|j| j.id == request_id) {
                    job.status = status;
                    job.progress = progress;
                }
            }
            MonitorEvent::SafetyAlert {
                category,
                severity,
                message,
            } => {
                self.safety.alerts.insert(
                    0,
                    SafetyAlert {
                        category,
                        severity,
                        message,
                    },
                );
                self.safety.alerts.truncate(MAX_ALERTS);
            }
        }
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> &String) {
    match items.iter().position(|existing| key(existing) == key(&item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{epoch, token_pair, user};
    use cosmos_domain::{DatasetStatus, GenerationStatus, TrainingStatus};
    use pretty_assertions::assert_eq;

    fn dataset(id: &str) -> Dataset {
        Dataset {
            id: id.into(),
            name: format!("set {id}"),
            description: None,
            status: DatasetStatus::Raw,
            video_count: 0,
            size_bytes: 0,
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    fn job(id: &str, status: TrainingStatus) -> TrainingJob {
        TrainingJob {
            id: id.into(),
            status,
            progress: 0.0,
            current_epoch: 0,
            config: None,
            error: None,
            created_at: None,
        }
    }

    fn signed_in() -> AppState {
        let mut state = AppState::default();
        let session = Session::authenticated(
            user(),
            &token_pair("u-1", epoch(), chrono::Duration::hours(1)),
            epoch(),
        );
        state.reduce(Action::SessionChanged(session));
        state
    }

    #[test]
    fn test_loading_and_failure_cycle() {
        let mut state = AppState::default();
        state.reduce(Action::DatasetsRequested);
        assert!(state.datasets.loading);

        state.reduce(Action::DatasetsFailed(ApiError::network("offline")));
        assert!(!state.datasets.loading);
        assert!(state.datasets.error.is_some());

        state.reduce(Action::DatasetsRequested);
        assert_eq!(state.datasets.error, None);
    }

    #[test]
    fn test_page_then_save_and_delete() {
        let mut state = AppState::default();
        state.reduce(Action::DatasetsLoaded(Page {
            items: vec![dataset("a"), dataset("b")],
            total: 2,
            page: 1,
            page_size: 20,
        }));

        let mut renamed = dataset("a");
        renamed.name = "renamed".into();
        state.reduce(Action::DatasetSaved(renamed));
        state.reduce(Action::DatasetDeleted("b".into()));

        assert_eq!(state.datasets.items.len(), 1);
        assert_eq!(state.datasets.items[0].name, "renamed");
        assert_eq!(state.datasets.total, 1);
    }

    #[test]
    fn test_monitor_events_update_known_items() {
        let mut state = AppState::default();
        state.reduce(Action::TrainingJobsLoaded(vec![job("t-1", TrainingStatus::Queued)]));
        state.reduce(Action::Monitor(MonitorEvent::TrainingProgress {
            job_id: "t-1".into(),
            status: TrainingStatus::Running,
            progress: 42.0,
            loss: Some(0.8),
        }));
        state.reduce(Action::Monitor(MonitorEvent::GenerationProgress {
            request_id: "unknown".into(),
            status: GenerationStatus::Processing,
            progress: 5.0,
        }));

        assert_eq!(state.training.jobs[0].status, TrainingStatus::Running);
        assert!((state.training.jobs[0].progress - 42.0).abs() < f64::EPSILON);
        assert!(state.generation.jobs.is_empty());
    }

    #[test]
    fn test_alerts_are_capped_newest_first() {
        let mut state = AppState::default();
        for n in 0..(MAX_ALERTS + 5) {
            state.reduce(Action::Monitor(MonitorEvent::SafetyAlert {
                category: "nsfw".into(),
                severity: Severity::High,
                message: format!("alert {n}"),
            }));
        }
        assert_eq!(state.safety.alerts.len(), MAX_ALERTS);
        assert_eq!(state.safety.alerts[0].message, format!("alert {}", MAX_ALERTS + 4));
    }

    #[test]
    fn test_sign_out_clears_fetched_data() {
        let mut state = signed_in();
        assert_eq!(state.auth.user.as_ref().map(|u| u.id.as_str()), Some("u-1"));
        state.reduce(Action::DatasetsLoaded(Page {
            items: vec![dataset("a")],
            total: 1,
            page: 1,
            page_size: 20,
        }));
        state.reduce(Action::ConnectionChanged(ConnectionState::Connected));

        state.reduce(Action::SessionChanged(Session::default()));

        assert_eq!(state.auth.phase, SessionPhase::Unauthenticated);
        assert!(state.datasets.items.is_empty());
        assert_eq!(state.connection, ConnectionState::Connected);
    }

    #[test]
    fn test_mfa_pending_keeps_user_hidden() {
        let mut state = AppState::default();
        state.reduce(Action::AuthRequested);
        state.reduce(Action::SessionChanged(Session::mfa_pending()));
        assert_eq!(state.auth.phase, SessionPhase::MfaPending);
        assert_eq!(state.auth.user, None);
        assert!(!state.auth.loading);
    }

    #[test]
    fn test_model_selection_is_exclusive() {
        let mut state = AppState::default();
        let model = |id: &str, selected| Model {
            id: id.into(),
            name: id.into(),
            model_type: cosmos_domain::ModelType::Diffusion,
            version: "1".into(),
            parameters: None,
            selected,
        };
        state.reduce(Action::ModelsLoaded(vec![model("a", true), model("b", false)]));
        state.reduce(Action::ModelSelected("b".into()));
        let selected: Vec<_> = state.models.items.iter().filter(|m| m.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "b");
    }
}
