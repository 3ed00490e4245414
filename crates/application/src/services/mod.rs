//! Platform services.
//!
//! Thin wrappers over the [`RequestExecutor`](crate::resilience::RequestExecutor):
//! each builds an [`ApiRequest`](cosmos_domain::ApiRequest), checks inputs
//! locally and returns the [`ApiResponse`] envelope unchanged.

mod datasets;
mod generation;
mod models;
mod safety;
mod training;

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use cosmos_domain::ApiResponse;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::polling::{Watch, spawn_poller};

pub use datasets::DatasetService;
pub use generation::GenerationService;
pub use models::ModelService;
pub use safety::SafetyService;
pub use training::TrainingService;

/// Polls `fetch` every `interval`, publishing each value, until `finished`
/// accepts one. Transient failures are skipped; any other failure ends
/// the watch with the last good value in place.
pub(crate) fn watch_until<T, F, Fut>(
    interval: Duration,
    mut fetch: F,
    finished: fn(&T) -> bool,
) -> Watch<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ApiResponse<T>> + Send + 'static,
{
    let (sender, updates) = watch::channel(None);
    let sender = Arc::new(sender);
    let handle = spawn_poller(interval, move || {
        let poll = fetch();
        let sender = Arc::clone(&sender);
        async move {
            match poll.await.into_result() {
                Ok(value) => {
                    let done = finished(&value);
                    sender.send_replace(Some(value));
                    if done {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
                Err(error) if error.kind.is_transient() => {
                    debug!(%error, "poll failed, retrying next tick");
                    ControlFlow::Continue(())
                }
                Err(error) => {
                    warn!(%error, "polling stopped");
                    ControlFlow::Break(())
                }
            }
        }
    });
    Watch { handle, updates }
}
