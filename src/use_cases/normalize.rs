// Maps backend errors onto the local error taxonomy.

use crate::domain::{AuthErrorKind, BackendError, LocalError};

// Row not found for a single-object request.
const NO_ROWS: &str = "PGRST116";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Normalizes a backend error. Never fails.
pub fn normalize(error: &BackendError) -> LocalError {
    match error {
        BackendError::Database { code, message } => match code.as_str() {
            NO_ROWS => LocalError::NotFound,
            UNIQUE_VIOLATION => LocalError::DuplicateEntry,
            FOREIGN_KEY_VIOLATION => LocalError::ForeignKeyViolation,
            _ => LocalError::DatabaseError(message.clone()),
        },
        BackendError::Auth { kind, message } => match kind {
            AuthErrorKind::WeakPassword => LocalError::WeakPassword,
            AuthErrorKind::EmailExists => LocalError::EmailAlreadyExists,
            AuthErrorKind::InvalidCredentials => LocalError::InvalidCredentials,
            AuthErrorKind::Other(_) => LocalError::AuthenticationError(message.clone()),
        },
        BackendError::Transport(_) => LocalError::NetworkError,
        BackendError::Other(description) => LocalError::Unknown(description.clone()),
    }
}

/// Normalizes any error, falling back to `Unknown` with its display text.
pub fn normalize_error(error: &(dyn std::error::Error + 'static)) -> LocalError {
    if let Some(local) = error.downcast_ref::<LocalError>() {
        return local.clone();
    }

    match error.downcast_ref::<BackendError>() {
        Some(backend) => normalize(backend),
        None => LocalError::Unknown(error.to_string()),
    }
}
