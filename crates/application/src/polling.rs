//! Cancellable background tasks.
//!
//! Every timer in the client (token refresh, idle watch, progress polling,
//! push reconnects) runs as a task owned by a [`TaskHandle`]. Stopping is
//! idempotent and dropping the handle stops the task.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owner of a background task.
#[derive(Debug)]
pub struct TaskHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawns `task` with a token that is cancelled when the handle stops.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(task(cancel.clone()));
        Self {
            cancel,
            join: Some(join),
        }
    }

    /// Asks the task to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Returns true once stop was requested or the task ended on its own.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the task to end without stopping it.
    pub async fn finished(mut self) {
        if let Some(join) = self.join.take()
            && let Err(error) = join.await
        {
            tracing::warn!(%error, "background task ended abnormally");
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A polling task together with the latest value it observed.
#[derive(Debug)]
pub struct Watch<T> {
    /// Controls the polling task.
    pub handle: TaskHandle,
    /// Latest observed value; `None` until the first successful poll.
    pub updates: watch::Receiver<Option<T>>,
}

impl<T: Clone> Watch<T> {
    /// Latest observed value.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.updates.borrow().clone()
    }

    /// Stops polling.
    pub fn stop(&self) {
        self.handle.stop();
    }
}

/// Runs `tick` immediately and then every `interval` until it breaks or the
/// handle is stopped. A stop request drops an in-flight tick.
pub fn spawn_poller<F, Fut>(interval: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    TaskHandle::spawn(move |cancel| async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                flow = tick() => {
                    if flow.is_break() {
                        break;
                    }
                }
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
    })
}
