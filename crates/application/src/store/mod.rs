//! Application state store.
//!
//! A single [`AppState`] changes only through [`Action`]s reduced
//! synchronously by [`Store::dispatch`]. Readers take snapshots or
//! subscribe to a watch channel. [`Effects`] runs service calls and turns
//! their outcomes into actions.

mod action;
mod effects;
pub mod selectors;
mod state;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

pub use action::Action;
pub use effects::{Effects, bind_monitor, bind_session};
pub use state::{
    AppState, AuthState, DatasetsState, GenerationState, MAX_ALERTS, ModelsState, SafetyAlert,
    SafetyState, TrainingState,
};

/// Holder of the application state. Clones share one state.
#[derive(Debug, Clone)]
pub struct Store {
    state: Arc<watch::Sender<AppState>>,
}

impl Store {
    /// Creates a store in the initial state.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Reduces `action` into the state and notifies subscribers.
    pub fn dispatch(&self, action: Action) {
        trace!(?action, "dispatch");
        self.state.send_modify(|state| state.reduce(action));
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Runs `selector` against the current state without copying it.
    pub fn select<R>(&self, selector: impl FnOnce(&AppState) -> R) -> R {
        selector(&self.state.borrow())
    }

    /// Receiver notified after every dispatch.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmos_domain::ApiError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dispatch_notifies_subscribers() {
        let store = Store::new();
        let mut updates = store.subscribe();
        assert!(!updates.has_changed().unwrap_or(true));

        store.dispatch(Action::ModelsRequested);

        assert!(updates.has_changed().unwrap_or(false));
        assert!(updates.borrow_and_update().models.loading);
        assert!(store.select(selectors::is_loading));
    }

    #[test]
    fn test_reset() {
        let store = Store::new();
        store.dispatch(Action::SafetyFailed(ApiError::network("offline")));
        store.dispatch(Action::Reset);
        assert_eq!(store.snapshot(), AppState::default());
    }
}
