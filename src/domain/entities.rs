use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Authenticated user as exposed on a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

// Session issued by the backend. Token material is opaque to the mirror.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: u64,
    pub user: User,
}

impl Session {
    /// Returns true once the access token is past its expiry.
    pub fn is_expired(&self, now_epoch_seconds: u64) -> bool {
        self.expires_at <= now_epoch_seconds
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

// User reference carried by `UserUpdated`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

/// Session lifecycle notifications emitted by the backend client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    PasswordRecoveryStarted,
    TokenRefreshed(Session),
    UserUpdated(UserRef),
    UserDeleted,
}

/// Payload-free tag for an `AuthEvent`, used in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    PasswordRecoveryStarted,
    TokenRefreshed,
    UserUpdated,
    UserDeleted,
}

impl AuthEvent {
    pub fn kind(&self) -> AuthEventKind {
        match self {
            AuthEvent::SignedIn(_) => AuthEventKind::SignedIn,
            AuthEvent::SignedOut => AuthEventKind::SignedOut,
            AuthEvent::PasswordRecoveryStarted => AuthEventKind::PasswordRecoveryStarted,
            AuthEvent::TokenRefreshed(_) => AuthEventKind::TokenRefreshed,
            AuthEvent::UserUpdated(_) => AuthEventKind::UserUpdated,
            AuthEvent::UserDeleted => AuthEventKind::UserDeleted,
        }
    }
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthEventKind::SignedIn => "signed_in",
            AuthEventKind::SignedOut => "signed_out",
            AuthEventKind::PasswordRecoveryStarted => "password_recovery",
            AuthEventKind::TokenRefreshed => "token_refreshed",
            AuthEventKind::UserUpdated => "user_updated",
            AuthEventKind::UserDeleted => "user_deleted",
        };
        f.write_str(name)
    }
}
