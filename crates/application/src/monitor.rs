//! Live updates from the platform's push channel.

use std::sync::Arc;

use cosmos_domain::{ConnectionState, MonitorEvent, MonitorSettings};
use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::polling::TaskHandle;
use crate::ports::{EventStream, MonitorError, PushChannel};

const EVENT_CAPACITY: usize = 256;

/// Keeps a push connection open and republishes its events.
///
/// After a drop or a failed connect it waits the fixed reconnect interval
/// and tries again. Consecutive failed connects are counted; reaching the
/// configured maximum (0 means unlimited) moves the state to
/// [`ConnectionState::Failed`] and ends the loop.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    channel: Arc<dyn PushChannel>,
    settings: MonitorSettings,
    events: broadcast::Sender<MonitorEvent>,
    state: watch::Sender<ConnectionState>,
}

enum Closed {
    Dropped,
    Cancelled,
}

impl Monitor {
    /// Creates an idle monitor.
    #[must_use]
    pub fn new(channel: Arc<dyn PushChannel>, settings: MonitorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                channel,
                settings,
                events,
                state,
            }),
        }
    }

    /// Receiver of pushed events. Subscribe before [`Self::start`] to see
    /// every event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Receiver of connection state changes.
    #[must_use]
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Starts the connect/read loop.
    #[must_use]
    pub fn start(&self) -> TaskHandle {
        let inner = Arc::clone(&self.inner);
        TaskHandle::spawn(move |cancel| async move { inner.run(cancel).await })
    }
}

impl Inner {
    async fn run(&self, cancel: CancellationToken) {
        let mut failures = 0u32;
        loop {
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                () = cancel.cancelled() => break,
                connected = self.channel.connect() => connected,
            };
            match connected {
                Ok(stream) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected);
                    info!("monitor connected");
                    if let Closed::Cancelled = self.forward(stream, &cancel).await {
                        break;
                    }
                    info!("monitor connection closed");
                }
                Err(MonitorError::NotConfigured) => {
                    info!("no push endpoint configured, monitor idle");
                    break;
                }
                Err(error) => {
                    failures += 1;
                    warn!(%error, attempt = failures, "monitor connection failed");
                }
            }

            let max = self.settings.max_reconnect_attempts;
            if max > 0 && failures >= max {
                warn!(attempts = failures, "giving up on the push channel");
                self.set_state(ConnectionState::Failed);
                return;
            }
            self.set_state(ConnectionState::Reconnecting);
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.reconnect_interval()) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn forward(&self, mut stream: EventStream, cancel: &CancellationToken) -> Closed {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Closed::Cancelled,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    debug!(?event, "monitor event");
                    // no receivers is fine
                    let _ = self.events.send(event);
                }
                Some(Err(MonitorError::Protocol(reason))) => {
                    warn!(%reason, "skipping unreadable monitor message");
                }
                Some(Err(error)) => {
                    warn!(%error, "monitor connection lost");
                    return Closed::Dropped;
                }
                None => return Closed::Dropped,
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("state", &*self.inner.state.borrow())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}
