// Locally observable mirror of the backend auth session.

use crate::domain::{AuthBackend, AuthEvent, Session};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of the mirrored session published to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorState {
    /// Latest session seen, replaced wholesale on every relevant event.
    pub current_session: Option<Session>,
    /// Set once the startup fetch has finished, whatever its outcome.
    pub initialized: bool,
}

impl MirrorState {
    /// True when a session with a non-nil user id is held.
    pub fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some()
    }

    pub fn current_user_id(&self) -> Option<Uuid> {
        self.current_session
            .as_ref()
            .map(|session| session.user.id)
            .filter(|id| !id.is_nil())
    }

    pub fn current_user_email(&self) -> Option<&str> {
        self.current_session
            .as_ref()
            .and_then(|session| session.user.email.as_deref())
    }
}

/// Applies one auth event to the mirrored session.
pub fn apply(current: Option<Session>, event: AuthEvent) -> Option<Session> {
    match event {
        AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => Some(session),
        AuthEvent::SignedOut | AuthEvent::UserDeleted => None,
        AuthEvent::PasswordRecoveryStarted | AuthEvent::UserUpdated(_) => current,
    }
}

/// Settings for the mirror's publication channels.
#[derive(Debug, Clone)]
pub struct MirrorSettings {
    /// Buffered updates per observer before it starts lagging.
    pub update_capacity: usize,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            update_capacity: 64,
        }
    }
}

/// Why the mirror task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorExit {
    /// The shutdown signal fired.
    Shutdown,
    /// The backend's event stream ended; the last state stays readable.
    StreamEnded,
}

/// Read-only handle observers use to follow the mirrored session.
#[derive(Clone)]
pub struct SessionMirror {
    state_rx: watch::Receiver<MirrorState>,
    // Kept only to hand out receivers; writes happen in the mirror task.
    updates_tx: broadcast::Sender<MirrorState>,
}

/// Unstarted mirror actor. Spawning consumes it, so the startup fetch runs once.
pub struct MirrorTask {
    state_tx: watch::Sender<MirrorState>,
    updates_tx: broadcast::Sender<MirrorState>,
}

impl SessionMirror {
    /// Creates the observer handle and the actor that will own all writes.
    pub fn new(settings: MirrorSettings) -> (SessionMirror, MirrorTask) {
        let (state_tx, state_rx) = watch::channel(MirrorState::default());
        let (updates_tx, _updates_rx) = broadcast::channel(settings.update_capacity.max(1));

        let mirror = SessionMirror {
            state_rx,
            updates_tx: updates_tx.clone(),
        };
        let task = MirrorTask {
            state_tx,
            updates_tx,
        };
        (mirror, task)
    }

    /// Latest published snapshot.
    pub fn state(&self) -> MirrorState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<MirrorState> {
        self.state_rx.clone()
    }

    /// Receiver that sees every published write, in order.
    pub fn updates(&self) -> broadcast::Receiver<MirrorState> {
        self.updates_tx.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state_rx.borrow().current_session.clone()
    }

    pub fn initialized(&self) -> bool {
        self.state_rx.borrow().initialized
    }

    pub fn is_authenticated(&self) -> bool {
        self.state_rx.borrow().is_authenticated()
    }

    pub fn current_user_id(&self) -> Option<Uuid> {
        self.state_rx.borrow().current_user_id()
    }

    pub fn current_user_email(&self) -> Option<String> {
        self.state_rx
            .borrow()
            .current_user_email()
            .map(str::to_string)
    }

    /// Waits until the startup fetch has finished. Returns false if the mirror
    /// task went away before that.
    pub async fn wait_initialized(&self) -> bool {
        let mut state_rx = self.state_rx.clone();
        state_rx.wait_for(|state| state.initialized).await.is_ok()
    }
}

impl MirrorTask {
    /// Spawns the mirror actor. Signal `shutdown` with `notify_one` to stop it.
    pub fn spawn<B>(self, backend: Arc<B>, shutdown: Arc<Notify>) -> JoinHandle<MirrorExit>
    where
        B: AuthBackend + ?Sized + 'static,
    {
        tokio::spawn(self.run(backend, shutdown))
    }

    /// Runs the startup fetch, then follows the event stream until it ends or
    /// shutdown fires.
    pub async fn run<B>(self, backend: Arc<B>, shutdown: Arc<Notify>) -> MirrorExit
    where
        B: AuthBackend + ?Sized,
    {
        // Open the stream before fetching so events raised meanwhile are kept.
        let mut events = backend.auth_events();
        let mut state = MirrorState::default();

        tokio::select! {
            _ = shutdown.notified() => {
                info!("session mirror stopped before startup fetch finished");
                return MirrorExit::Shutdown;
            }
            fetched = backend.fetch_current_session() => {
                match fetched {
                    Ok(session) => {
                        info!(has_session = session.is_some(), "startup session loaded");
                        state.current_session = session;
                    }
                    Err(error) => {
                        warn!(%error, "failed to load startup session; starting signed out");
                        state.current_session = None;
                    }
                }
                state.initialized = true;
                self.publish(&state);
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("session mirror shutting down");
                    return MirrorExit::Shutdown;
                }
                next = events.next() => {
                    let Some(event) = next else {
                        warn!("auth event stream ended; session mirror stops updating");
                        return MirrorExit::StreamEnded;
                    };

                    let kind = event.kind();
                    state.current_session = apply(state.current_session.take(), event);
                    debug!(
                        event = %kind,
                        authenticated = state.is_authenticated(),
                        "auth event applied"
                    );
                    self.publish(&state);
                }
            }
        }
    }

    fn publish(&self, state: &MirrorState) {
        self.state_tx.send_replace(state.clone());
        // No observers is fine.
        let _ = self.updates_tx.send(state.clone());
    }
}
