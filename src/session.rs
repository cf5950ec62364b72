use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    time::Duration,
};

use tokio::sync::watch;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    error::HubError,
    externals::ble::transport::{HubLink, HubTransport},
    models::{config::HubFilter, session_state::SessionState},
    tasks::notifications::{task_pump_notifications, PumpExit},
};

fn cancelled() -> HubError {
    HubError::Connection("Connect was cancelled by disconnect.".into())
}

pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Returned by `on_notification`, used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// The link of one successful `connect`, together with the token that
/// cancels everything tied to it.
struct ActiveLink {
    id: u64,
    link: Arc<dyn HubLink>,
    token: CancellationToken,
}

struct Shared {
    state: watch::Sender<SessionState>,
    active: Mutex<Option<ActiveLink>>,
    handlers: RwLock<Vec<(HandlerId, NotificationHandler)>>,
    next_id: AtomicU64,

    /// Cancels the connect in progress, if any.
    attempt: Mutex<Option<CancellationToken>>,
}

impl Shared {
    /// Drop the active link and cancel its token. With `Some(id)` only the
    /// link from that connect is released, so a late report from an old
    /// link can't tear down a newer one.
    fn release(&self, id: Option<u64>) -> Option<ActiveLink> {
        let released = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let matches = match (active.as_ref(), id) {
                (Some(current), Some(id)) => current.id == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                return None;
            }
            active.take()
        };

        if let Some(released) = &released {
            released.token.cancel();
            self.state.send_replace(SessionState::Disconnected);
        }
        released
    }

    /// Back to `Disconnected` after a connect that didn't make it.
    fn abort_connect(&self) {
        self.attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state.send_replace(SessionState::Disconnected);
    }

    fn dispatch(&self, frame: &[u8]) {
        let handlers: Vec<NotificationHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(frame);
        }
    }
}

/// Owns the BLE link of one hub: connects through a `HubTransport`, writes
/// frames, and delivers inbound frames to the registered handlers.
pub struct ConnectionSession {
    transport: Arc<dyn HubTransport>,
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl ConnectionSession {
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            shared: Arc::new(Shared {
                state,
                active: Mutex::new(None),
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                attempt: Mutex::new(None),
            }),
            tracker: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Token of the current link. Already cancelled when not connected.
    pub fn connection_token(&self) -> CancellationToken {
        match self
            .shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(active) => active.token.clone(),
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    /// Register a handler for every inbound frame. Handlers run on the
    /// notification task in registration order and must not block.
    pub fn on_notification<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let id = HandlerId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` when the handler was already removed.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self
            .shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Scan for a hub matching `filter` and connect to it, giving up after
    /// `timeout`. A `disconnect` while scanning aborts the attempt.
    #[instrument(skip_all)]
    pub async fn connect(&self, filter: &HubFilter, timeout: Duration) -> Result<(), HubError> {
        let attempt = CancellationToken::new();
        {
            // same lock disconnect takes, so it sees the attempt once the
            // session is Connecting
            let _active = self
                .shared
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let entered = self.shared.state.send_if_modified(|state| {
                if *state == SessionState::Disconnected {
                    *state = SessionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !entered {
                return Err(HubError::Connection(format!(
                    "Session is already {}.",
                    *self.shared.state.borrow()
                )));
            }
            *self
                .shared
                .attempt
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(attempt.clone());
        }
        info!("Connecting.");

        let link: Arc<dyn HubLink> = tokio::select! {
            biased;
            _ = attempt.cancelled() => {
                warn!("Connect cancelled.");
                self.shared.abort_connect();
                return Err(cancelled());
            },
            result = tokio::time::timeout(timeout, self.transport.connect(filter)) => match result {
                Err(_) => {
                    warn!("No hub found within {:?}.", timeout);
                    self.shared.abort_connect();
                    return Err(HubError::Connection(format!(
                        "No matching hub found within {:?}.",
                        timeout
                    )));
                }
                Ok(Err(e)) => {
                    error!("Failed to connect. Error: {}", e);
                    self.shared.abort_connect();
                    return Err(e);
                }
                Ok(Ok(link)) => Arc::from(link),
            },
        };

        let frames = match link.notifications().await {
            Err(e) => {
                error!("Failed to open notification stream. Error: {}", e);
                if let Err(e) = link.disconnect().await {
                    debug!("Failed to release link. Error: {}", e);
                }
                self.shared.abort_connect();
                return Err(e);
            }
            Ok(frames) => frames,
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let installed = {
            // disconnect cancels the attempt under this lock, so it either
            // finds the installed link or the cancelled attempt is seen here
            let mut active = self
                .shared
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if attempt.is_cancelled() {
                Err(link)
            } else {
                *active = Some(ActiveLink {
                    id,
                    link,
                    token: token.clone(),
                });
                self.shared
                    .attempt
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                self.shared.state.send_replace(SessionState::Connected);
                Ok(())
            }
        };
        if let Err(link) = installed {
            warn!("Connect cancelled.");
            if let Err(e) = link.disconnect().await {
                debug!("Failed to release link. Error: {}", e);
            }
            self.shared.abort_connect();
            return Err(cancelled());
        }

        let shared = self.shared.clone();
        self.tracker.spawn(async move {
            let dispatcher = shared.clone();
            let exit =
                task_pump_notifications(token, frames, move |frame| dispatcher.dispatch(frame))
                    .await;
            if exit == PumpExit::StreamEnded {
                if let Some(lost) = shared.release(Some(id)) {
                    warn!("Link lost.");
                    if let Err(e) = lost.link.disconnect().await {
                        debug!("Failed to release lost link. Error: {}", e);
                    }
                }
            }
        });

        info!("Connected.");
        Ok(())
    }

    /// Write one frame. A transport failure drops the link: the session goes
    /// back to `Disconnected` and everything queued behind this write fails.
    #[instrument(skip_all)]
    pub async fn write(&self, bytes: &[u8]) -> Result<(), HubError> {
        let (id, link) = {
            let active = self
                .shared
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match active.as_ref() {
                Some(active) => (active.id, active.link.clone()),
                None => return Err(HubError::Connection("Session is not connected.".into())),
            }
        };

        match link.write(bytes).await {
            Ok(()) => {
                trace!("Wrote {} bytes.", bytes.len());
                Ok(())
            }
            Err(e) => {
                error!("Failed to write to hub, dropping link. Error: {}", e);
                if let Some(lost) = self.shared.release(Some(id)) {
                    self.tracker.spawn(async move {
                        if let Err(e) = lost.link.disconnect().await {
                            debug!("Failed to release link. Error: {}", e);
                        }
                    });
                }
                Err(match e {
                    HubError::Transport(_) => e,
                    other => HubError::Transport(other.to_string()),
                })
            }
        }
    }

    /// Release the link, or abort a connect that is still scanning. Safe to
    /// call any number of times.
    #[instrument(skip_all)]
    pub async fn disconnect(&self) {
        {
            let _active = self
                .shared
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(attempt) = self
                .shared
                .attempt
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                info!("Aborting connect.");
                attempt.cancel();
            }
        }

        match self.shared.release(None) {
            Some(released) => {
                info!("Disconnecting.");
                if let Err(e) = released.link.disconnect().await {
                    warn!("Failed to disconnect cleanly. Error: {}", e);
                }
            }
            None => debug!("Already disconnected."),
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
