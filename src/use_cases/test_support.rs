use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use crate::domain::{AuthBackend, AuthEvent, BackendError, Session, User};

// Builds a session whose email is derived from `tag`.
pub(crate) fn session(tag: &str) -> Session {
    Session {
        access_token: format!("access-{tag}"),
        refresh_token: format!("refresh-{tag}"),
        token_type: "bearer".to_string(),
        expires_at: 1_700_003_600,
        user: User {
            id: Uuid::new_v4(),
            email: Some(format!("{tag}@example.com")),
        },
    }
}

// Backend fake with a canned startup result and a test-driven event stream.
pub(crate) struct ScriptedBackend {
    startup: Mutex<Option<Result<Option<Session>, BackendError>>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<AuthEvent>>>,
}

impl ScriptedBackend {
    pub(crate) fn new(
        startup: Result<Option<Session>, BackendError>,
    ) -> (Self, mpsc::UnboundedSender<AuthEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let backend = Self {
            startup: Mutex::new(Some(startup)),
            fetch_gate: Mutex::new(None),
            events: Mutex::new(Some(events_rx)),
        };
        (backend, events_tx)
    }

    // Holds the startup fetch until the returned gate is notified.
    pub(crate) fn gate_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let mut guard = self.fetch_gate.lock().expect("fetch gate mutex poisoned");
        *guard = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn fetch_current_session(&self) -> Result<Option<Session>, BackendError> {
        let gate = self
            .fetch_gate
            .lock()
            .expect("fetch gate mutex poisoned")
            .clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.startup
            .lock()
            .expect("startup mutex poisoned")
            .take()
            .expect("startup session fetched more than once")
    }

    fn auth_events(&self) -> BoxStream<'static, AuthEvent> {
        let Some(events_rx) = self.events.lock().expect("events mutex poisoned").take() else {
            return stream::empty().boxed();
        };

        stream::unfold(events_rx, |mut events_rx| async move {
            let event = events_rx.recv().await?;
            Some((event, events_rx))
        })
        .boxed()
    }
}
