use std::fmt;

// Application-level error kinds shown to users.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalError {
    NotFound,
    DuplicateEntry,
    ForeignKeyViolation,
    DatabaseError(String),
    AuthenticationError(String),
    WeakPassword,
    EmailAlreadyExists,
    InvalidCredentials,
    NetworkError,
    Unknown(String),
}

impl fmt::Display for LocalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalError::NotFound => write!(f, "The requested data could not be found."),
            LocalError::DuplicateEntry => write!(f, "This entry already exists."),
            LocalError::ForeignKeyViolation => {
                write!(f, "This entry references data that does not exist.")
            }
            LocalError::DatabaseError(message) => write!(f, "Database error: {message}"),
            LocalError::AuthenticationError(message) => {
                write!(f, "Authentication error: {message}")
            }
            LocalError::WeakPassword => {
                write!(f, "The password is too weak. Please choose a stronger one.")
            }
            LocalError::EmailAlreadyExists => {
                write!(f, "An account with this email already exists.")
            }
            LocalError::InvalidCredentials => write!(f, "The email or password is incorrect."),
            LocalError::NetworkError => {
                write!(f, "A network error occurred. Please check your connection.")
            }
            LocalError::Unknown(message) => write!(f, "An unknown error occurred: {message}"),
        }
    }
}

impl std::error::Error for LocalError {}

/// Auth error category as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthErrorKind {
    WeakPassword,
    EmailExists,
    InvalidCredentials,
    Other(String),
}

impl AuthErrorKind {
    /// Classifies a backend auth error code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "weak_password" => AuthErrorKind::WeakPassword,
            "email_exists" | "user_already_exists" => AuthErrorKind::EmailExists,
            "invalid_credentials" => AuthErrorKind::InvalidCredentials,
            other => AuthErrorKind::Other(other.to_string()),
        }
    }
}

// Structured error data extracted from backend responses at the adapter boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendError {
    Database { code: String, message: String },
    Auth { kind: AuthErrorKind, message: String },
    Transport(String),
    Other(String),
}

impl BackendError {
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn auth(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        BackendError::Auth {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Database { code, message } => {
                write!(f, "database error {code}: {message}")
            }
            BackendError::Auth { kind, message } => write!(f, "auth error {kind:?}: {message}"),
            BackendError::Transport(message) => write!(f, "backend transport error: {message}"),
            BackendError::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for BackendError {}
