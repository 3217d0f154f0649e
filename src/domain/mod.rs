// Domain layer: session, auth event and error types plus the backend ports.

pub mod entities;
pub mod errors;
pub mod ports;

pub use entities::{AuthEvent, AuthEventKind, Session, User, UserRef};
pub use errors::{AuthErrorKind, BackendError, LocalError};
pub use ports::{AuthBackend, Clock, SessionStorage, SystemClock};
