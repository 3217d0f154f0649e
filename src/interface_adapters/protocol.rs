use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AuthErrorKind, BackendError, Session, User, UserRef};

// Wire DTOs for the backend's REST surface. Kept out of the domain layer.

#[derive(Debug, Serialize)]
pub struct PasswordCredentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RecoverRequest<'a> {
    pub email: &'a str,
}

/// Attributes accepted by the user update endpoint. Absent fields are left alone.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserDto {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<UserDto> for User {
    fn from(dto: UserDto) -> Self {
        User {
            id: dto.id,
            email: dto.email,
        }
    }
}

impl From<UserDto> for UserRef {
    fn from(dto: UserDto) -> Self {
        UserRef {
            id: dto.id,
            email: dto.email,
        }
    }
}

// Token grant response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub user: UserDto,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    // Prefers the absolute expiry and falls back to `now + expires_in`.
    pub fn into_session(self, now_epoch_seconds: u64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| {
                self.expires_in
                    .map(|secs| now_epoch_seconds.saturating_add(secs))
            })
            .unwrap_or(now_epoch_seconds);

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user.into(),
        }
    }
}

// Sign-up returns a session when confirmation is disabled, otherwise just the user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenResponse),
    User(UserDto),
}

// `code` is a machine-readable string on some deployments and the HTTP status on others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthErrorCode {
    Name(String),
    Status(u16),
}

// Error body returned by the auth endpoints. Older deployments use the
// `error`/`error_description` pair instead of `error_code`/`msg`.
#[derive(Debug, Default, Deserialize)]
pub struct AuthErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub code: Option<AuthErrorCode>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl AuthErrorBody {
    pub fn into_backend_error(self, status: u16) -> BackendError {
        let message = self
            .msg
            .or(self.message)
            .or(self.error_description)
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("auth request failed with status {status}"));

        let code = self.error_code.or(match self.code {
            Some(AuthErrorCode::Name(name)) => Some(name),
            Some(AuthErrorCode::Status(_)) | None => None,
        });

        let kind = match code.as_deref() {
            Some(code) => AuthErrorKind::from_code(code),
            // Legacy password grant failure.
            None if self.error.as_deref() == Some("invalid_grant")
                && message.contains("Invalid login credentials") =>
            {
                AuthErrorKind::InvalidCredentials
            }
            None => AuthErrorKind::Other(self.error.unwrap_or_else(|| status.to_string())),
        };

        BackendError::Auth { kind, message }
    }
}

// Error body returned by the database REST endpoints.
#[derive(Debug, Deserialize)]
pub struct DatabaseErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl From<DatabaseErrorBody> for BackendError {
    fn from(body: DatabaseErrorBody) -> Self {
        BackendError::Database {
            code: body.code,
            message: body.message,
        }
    }
}
