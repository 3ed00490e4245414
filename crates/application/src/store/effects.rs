//! Service calls that feed the store.

use std::future::Future;

use cosmos_domain::{
    ApiError, ApiResponse, Credentials, CurationFilters, CurationJob, Dataset, DatasetDraft,
    DatasetQuery, GenerationJob, GenerationRequest, GuardrailConfig, Model, ModelType, Page,
    SafetyEvent, SessionPhase, TrainingConfig, TrainingJob, TrainingMetrics,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{Action, Store};
use crate::auth::SessionManager;
use crate::monitor::Monitor;
use crate::polling::TaskHandle;
use crate::services::{
    DatasetService, GenerationService, ModelService, SafetyService, TrainingService,
};

/// Runs service calls and dispatches `*Requested` before and
/// `*Loaded`/`*Failed` after each one.
#[derive(Debug, Clone)]
pub struct Effects {
    store: Store,
    session: SessionManager,
    datasets: DatasetService,
    models: ModelService,
    training: TrainingService,
    safety: SafetyService,
    generation: GenerationService,
}

impl Effects {
    /// Wires the store to the session and services.
    #[must_use]
    pub const fn new(
        store: Store,
        session: SessionManager,
        datasets: DatasetService,
        models: ModelService,
        training: TrainingService,
        safety: SafetyService,
        generation: GenerationService,
    ) -> Self {
        Self {
            store,
            session,
            datasets,
            models,
            training,
            safety,
            generation,
        }
    }

    /// The store actions are dispatched to.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Logs in and mirrors the resulting session.
    ///
    /// # Errors
    ///
    /// Returns the session manager's error after dispatching it.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionPhase, ApiError> {
        self.store.dispatch(Action::AuthRequested);
        let result = self.session.login(credentials).await;
        self.settle_auth(result)
    }

    /// Submits the second-factor code.
    ///
    /// # Errors
    ///
    /// Returns the session manager's error after dispatching it.
    pub async fn verify_mfa(&self, code: &str) -> Result<(), ApiError> {
        self.store.dispatch(Action::AuthRequested);
        let result = self.session.verify_mfa(code).await;
        self.settle_auth(result)
    }

    /// Completes an OAuth login.
    ///
    /// # Errors
    ///
    /// Returns the session manager's error after dispatching it.
    pub async fn oauth_login(&self, provider: &str, code: &str) -> Result<(), ApiError> {
        self.store.dispatch(Action::AuthRequested);
        let result = self.session.oauth_login(provider, code).await;
        self.settle_auth(result)
    }

    /// Logs out.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.store.dispatch(Action::SessionChanged(self.session.session()));
    }

    fn settle_auth<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        match &result {
            Ok(_) => self
                .store
                .dispatch(Action::SessionChanged(self.session.session())),
            Err(error) => self.store.dispatch(Action::AuthFailed(error.clone())),
        }
        result
    }

    /// Loads a page of datasets.
    pub async fn load_datasets(&self, query: &DatasetQuery) -> ApiResponse<Page<Dataset>> {
        self.run(
            Action::DatasetsRequested,
            self.datasets.list(query),
            Action::DatasetsLoaded,
            Action::DatasetsFailed,
        )
        .await
    }

    /// Creates a dataset, or updates it when `id` is given.
    pub async fn save_dataset(&self, id: Option<&str>, draft: &DatasetDraft) -> ApiResponse<Dataset> {
        let call = async {
            match id {
                Some(id) => self.datasets.update(id, draft).await,
                None => self.datasets.create(draft).await,
            }
        };
        self.run(
            Action::DatasetsRequested,
            call,
            Action::DatasetSaved,
            Action::DatasetsFailed,
        )
        .await
    }

    /// Deletes a dataset.
    pub async fn delete_dataset(&self, id: &str) -> ApiResponse<()> {
        let deleted = id.to_string();
        self.run(
            Action::DatasetsRequested,
            self.datasets.delete(id),
            move |()| Action::DatasetDeleted(deleted),
            Action::DatasetsFailed,
        )
        .await
    }

    /// Starts curation and reloads the dataset to show its new status.
    pub async fn curate_dataset(
        &self,
        id: &str,
        filters: &CurationFilters,
    ) -> ApiResponse<CurationJob> {
        self.store.dispatch(Action::DatasetsRequested);
        let response = self.datasets.curate(id, filters).await;
        match &response.error {
            Some(error) => self.store.dispatch(Action::DatasetsFailed(error.clone())),
            None => {
                let refreshed = self.datasets.get(id).await;
                match refreshed.into_result() {
                    Ok(dataset) => self.store.dispatch(Action::DatasetSaved(dataset)),
                    Err(error) => self.store.dispatch(Action::DatasetsFailed(error)),
                }
            }
        }
        response
    }

    /// Loads the model catalogue.
    pub async fn load_models(&self, model_type: Option<ModelType>) -> ApiResponse<Vec<Model>> {
        self.run(
            Action::ModelsRequested,
            self.models.list(model_type),
            Action::ModelsLoaded,
            Action::ModelsFailed,
        )
        .await
    }

    /// Makes a model the active one.
    pub async fn select_model(&self, id: &str) -> ApiResponse<Model> {
        self.run(
            Action::ModelsRequested,
            self.models.select(id),
            |model: Model| Action::ModelSelected(model.id),
            Action::ModelsFailed,
        )
        .await
    }

    /// Loads training jobs.
    pub async fn load_training_jobs(&self) -> ApiResponse<Vec<TrainingJob>> {
        self.run(
            Action::TrainingRequested,
            self.training.list_jobs(),
            Action::TrainingJobsLoaded,
            Action::TrainingFailed,
        )
        .await
    }

    /// Submits a training job.
    pub async fn create_training_job(&self, config: &TrainingConfig) -> ApiResponse<TrainingJob> {
        self.run(
            Action::TrainingRequested,
            self.training.create_job(config),
            Action::TrainingJobUpdated,
            Action::TrainingFailed,
        )
        .await
    }

    /// Cancels a training job.
    pub async fn cancel_training_job(&self, id: &str) -> ApiResponse<TrainingJob> {
        self.run(
            Action::TrainingRequested,
            self.training.cancel_job(id),
            Action::TrainingJobUpdated,
            Action::TrainingFailed,
        )
        .await
    }

    /// Loads a job's metrics.
    pub async fn load_training_metrics(&self, id: &str) -> ApiResponse<TrainingMetrics> {
        self.run(
            Action::TrainingRequested,
            self.training.metrics(id),
            Action::TrainingMetricsLoaded,
            Action::TrainingFailed,
        )
        .await
    }

    /// Loads the guardrail configuration.
    pub async fn load_guardrails(&self) -> ApiResponse<GuardrailConfig> {
        self.run(
            Action::SafetyRequested,
            self.safety.guardrails(),
            Action::GuardrailsLoaded,
            Action::SafetyFailed,
        )
        .await
    }

    /// Saves the guardrail configuration.
    pub async fn save_guardrails(&self, config: &GuardrailConfig) -> ApiResponse<GuardrailConfig> {
        self.run(
            Action::SafetyRequested,
            self.safety.update_guardrails(config),
            Action::GuardrailsLoaded,
            Action::SafetyFailed,
        )
        .await
    }

    /// Loads recent safety events.
    pub async fn load_safety_events(&self, limit: Option<u32>) -> ApiResponse<Vec<SafetyEvent>> {
        self.run(
            Action::SafetyRequested,
            self.safety.events(limit),
            Action::SafetyEventsLoaded,
            Action::SafetyFailed,
        )
        .await
    }

    /// Submits a generation request.
    pub async fn submit_generation(&self, request: &GenerationRequest) -> ApiResponse<GenerationJob> {
        self.run(
            Action::GenerationRequested,
            self.generation.submit(request),
            Action::GenerationUpdated,
            Action::GenerationFailed,
        )
        .await
    }

    /// Refreshes one generation job.
    pub async fn refresh_generation(&self, id: &str) -> ApiResponse<GenerationJob> {
        self.run(
            Action::GenerationRequested,
            self.generation.status(id),
            Action::GenerationUpdated,
            Action::GenerationFailed,
        )
        .await
    }

    /// Cancels a generation job.
    pub async fn cancel_generation(&self, id: &str) -> ApiResponse<GenerationJob> {
        self.run(
            Action::GenerationRequested,
            self.generation.cancel(id),
            Action::GenerationUpdated,
            Action::GenerationFailed,
        )
        .await
    }

    async fn run<T: Clone>(
        &self,
        requested: Action,
        call: impl Future<Output = ApiResponse<T>>,
        loaded: impl FnOnce(T) -> Action,
        failed: impl FnOnce(ApiError) -> Action,
    ) -> ApiResponse<T> {
        self.store.dispatch(requested);
        let response = call.await;
        match (&response.data, &response.error) {
            (_, Some(error)) => self.store.dispatch(failed(error.clone())),
            (Some(data), None) => self.store.dispatch(loaded(data.clone())),
            (None, None) => {
                self.store
                    .dispatch(failed(ApiError::internal("response carried neither data nor error")));
            }
        }
        response
    }
}

/// Mirrors every session change into the store until stopped.
#[must_use]
pub fn bind_session(store: &Store, session: &SessionManager) -> TaskHandle {
    let store = store.clone();
    let mut updates = session.subscribe();
    TaskHandle::spawn(move |cancel| async move {
        loop {
            let session = updates.borrow_and_update().clone();
            store.dispatch(Action::SessionChanged(session));
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("session binding stopped");
    })
}

/// Feeds pushed events and connection state into the store until stopped.
#[must_use]
pub fn bind_monitor(store: &Store, monitor: &Monitor) -> TaskHandle {
    let store = store.clone();
    let mut events = monitor.subscribe();
    let mut state = monitor.connection_state();
    TaskHandle::spawn(move |cancel| async move {
        store.dispatch(Action::ConnectionChanged(*state.borrow_and_update()));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => store.dispatch(Action::Monitor(event)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "store fell behind the monitor, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    store.dispatch(Action::ConnectionChanged(current));
                }
            }
        }
        debug!("monitor binding stopped");
    })
}
