//! Store actions.

use cosmos_domain::{
    ApiError, ConnectionState, Dataset, GenerationJob, GuardrailConfig, Model, MonitorEvent,
    Page, SafetyEvent, Session, TrainingJob, TrainingMetrics,
};

/// Everything that can change [`AppState`](super::AppState).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The session manager published a new session.
    SessionChanged(Session),
    /// A login, MFA or OAuth step started.
    AuthRequested,
    /// A login, MFA or OAuth step failed.
    AuthFailed(ApiError),

    /// A dataset call started.
    DatasetsRequested,
    /// A dataset page arrived.
    DatasetsLoaded(Page<Dataset>),
    /// A dataset was created, fetched or updated.
    DatasetSaved(Dataset),
    /// A dataset was deleted.
    DatasetDeleted(String),
    /// A dataset call failed.
    DatasetsFailed(ApiError),

    /// A model call started.
    ModelsRequested,
    /// The model list arrived.
    ModelsLoaded(Vec<Model>),
    /// A model became the active one.
    ModelSelected(String),
    /// A model call failed.
    ModelsFailed(ApiError),

    /// A training call started.
    TrainingRequested,
    /// The job list arrived.
    TrainingJobsLoaded(Vec<TrainingJob>),
    /// One job was created, fetched or cancelled.
    TrainingJobUpdated(TrainingJob),
    /// Metrics for one job arrived.
    TrainingMetricsLoaded(TrainingMetrics),
    /// A training call failed.
    TrainingFailed(ApiError),

    /// A safety call started.
    SafetyRequested,
    /// Guardrail configuration arrived or was saved.
    GuardrailsLoaded(GuardrailConfig),
    /// Safety events arrived.
    SafetyEventsLoaded(Vec<SafetyEvent>),
    /// A safety call failed.
    SafetyFailed(ApiError),

    /// A generation call started.
    GenerationRequested,
    /// A generation job was submitted or polled.
    GenerationUpdated(GenerationJob),
    /// A generation call failed.
    GenerationFailed(ApiError),

    /// The push channel delivered an event.
    Monitor(MonitorEvent),
    /// The push channel changed state.
    ConnectionChanged(ConnectionState),
    /// Back to the initial state.
    Reset,
}
