use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::entities::{AuthEvent, Session};
use crate::domain::errors::BackendError;

// Port for the backend client that owns the real session.
// The mirror depends on this trait, not on the concrete client.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    // One-shot lookup of the session the client currently holds, if any.
    async fn fetch_current_session(&self) -> Result<Option<Session>, BackendError>;

    // Ordered stream of auth lifecycle events. Expected not to end.
    fn auth_events(&self) -> BoxStream<'static, AuthEvent>;
}

// Port for persisting the session between process runs.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self) -> Result<Option<Session>, String>;
    async fn save(&self, session: &Session) -> Result<(), String>;
    async fn clear(&self) -> Result<(), String>;
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}
