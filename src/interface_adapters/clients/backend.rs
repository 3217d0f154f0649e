use crate::domain::{
    AuthBackend, AuthErrorKind, AuthEvent, BackendError, Clock, Session, SessionStorage,
    SystemClock, UserRef,
};
use crate::interface_adapters::protocol::{
    AuthErrorBody, DatabaseErrorBody, PasswordCredentials, RecoverRequest, RefreshTokenRequest,
    SignUpResponse, TokenResponse, UserAttributes, UserDto,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

// Buffered auth events per subscriber before it starts lagging.
const AUTH_EVENT_CAPACITY: usize = 32;
// Asks the database endpoint for exactly one object; zero rows become PGRST116.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

// Thin reqwest client for the hosted backend's auth and database endpoints.
// Owns the session lifecycle and emits auth events the way the backend SDK does.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
    anon_key: String,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    events_tx: broadcast::Sender<AuthEvent>,
}

impl BackendClient {
    pub fn new(
        base_url: Url,
        anon_key: impl Into<String>,
        timeout: Duration,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        let (events_tx, _events_rx) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.into(),
            storage,
            clock: Arc::new(SystemClock),
            events_tx,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[tracing::instrument(name = "sign_in_with_password", skip_all)]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let url = self.token_url("password")?;
        let request = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&PasswordCredentials { email, password });
        let token: TokenResponse = send_auth(request).await?;

        let session = token.into_session(self.clock.now_epoch_seconds());
        self.persist(&session).await;
        info!(user_id = %session.user.id, "signed in");
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Registers a new account. Returns `None` when the backend requires email
    /// confirmation before issuing a session.
    #[tracing::instrument(name = "sign_up", skip_all)]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Session>, BackendError> {
        let url = self.endpoint("auth/v1/signup")?;
        let request = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&PasswordCredentials { email, password });

        match send_auth::<SignUpResponse>(request).await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(self.clock.now_epoch_seconds());
                self.persist(&session).await;
                info!(user_id = %session.user.id, "signed up");
                self.emit(AuthEvent::SignedIn(session.clone()));
                Ok(Some(session))
            }
            SignUpResponse::User(user) => {
                info!(user_id = %user.id, "signed up; awaiting email confirmation");
                Ok(None)
            }
        }
    }

    /// Revokes the session remotely and always drops it locally.
    #[tracing::instrument(name = "sign_out", skip_all)]
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let stored = self.stored_session().await.unwrap_or_else(|error| {
            warn!(%error, "failed to load persisted session for sign out");
            None
        });
        let remote = match stored {
            Some(session) => match self.endpoint("auth/v1/logout") {
                Ok(url) => {
                    let request = self
                        .http
                        .post(url)
                        .header("apikey", &self.anon_key)
                        .bearer_auth(&session.access_token);
                    send_auth_empty(request).await
                }
                Err(error) => Err(error),
            },
            None => Ok(()),
        };

        if let Err(error) = self.storage.clear().await {
            warn!(%error, "failed to clear persisted session");
        }
        info!("signed out");
        self.emit(AuthEvent::SignedOut);
        remote
    }

    #[tracing::instrument(name = "refresh_session", skip_all)]
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let Some(current) = self.stored_session().await? else {
            return Err(session_missing());
        };
        self.refresh_with(&current.refresh_token).await
    }

    #[tracing::instrument(name = "reset_password_for_email", skip_all)]
    pub async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError> {
        let url = self.endpoint("auth/v1/recover")?;
        let request = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&RecoverRequest { email });
        send_auth_empty(request).await?;

        info!("password recovery requested");
        self.emit(AuthEvent::PasswordRecoveryStarted);
        Ok(())
    }

    #[tracing::instrument(name = "update_user", skip_all)]
    pub async fn update_user(&self, attributes: UserAttributes) -> Result<UserRef, BackendError> {
        let Some(mut session) = self.stored_session().await? else {
            return Err(session_missing());
        };

        let url = self.endpoint("auth/v1/user")?;
        let request = self
            .http
            .put(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&attributes);
        let user: UserDto = send_auth(request).await?;

        session.user = user.clone().into();
        self.persist(&session).await;
        let user = UserRef::from(user);
        info!(user_id = %user.id, "user updated");
        self.emit(AuthEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    /// Reads rows from a table. `filters` are passed through as query pairs,
    /// e.g. `("id", "eq.42")`.
    pub async fn select_rows<T>(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned,
    {
        let url = self.table_url(table, filters)?;
        let request = self.authorized(self.http.get(url)).await;
        send_database(request).await
    }

    /// Reads exactly one row. Zero or several matches fail with `PGRST116`.
    pub async fn select_single<T>(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
    {
        let url = self.table_url(table, filters)?;
        let request = self
            .authorized(self.http.get(url))
            .await
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT));
        send_database(request).await
    }

    /// Inserts one row and returns it as stored.
    pub async fn insert_row<T, R>(&self, table: &str, row: &T) -> Result<R, BackendError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.table_url(table, &[])?;
        let request = self
            .authorized(self.http.post(url))
            .await
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .header("Prefer", "return=representation")
            .json(row);
        send_database(request).await
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let url = self.token_url("refresh_token")?;
        let request = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&RefreshTokenRequest { refresh_token });
        let token: TokenResponse = send_auth(request).await?;

        let session = token.into_session(self.clock.now_epoch_seconds());
        self.persist(&session).await;
        debug!(expires_at = session.expires_at, "token refreshed");
        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    // Attaches the caller's access token, or the anon key when signed out.
    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("apikey", &self.anon_key);
        let stored = self.stored_session().await.unwrap_or_else(|error| {
            warn!(%error, "unreadable persisted session; using anon key");
            None
        });
        match stored {
            Some(session) => request.bearer_auth(session.access_token),
            None => request.bearer_auth(&self.anon_key),
        }
    }

    async fn stored_session(&self) -> Result<Option<Session>, BackendError> {
        self.storage.load().await.map_err(BackendError::Other)
    }

    // Storage failures are not fatal; the session stays valid for this process.
    async fn persist(&self, session: &Session) {
        if let Err(error) = self.storage.save(session).await {
            warn!(%error, "failed to persist session");
        }
    }

    // Drops a persisted session that can no longer be used.
    async fn discard_session(&self) {
        if let Err(error) = self.storage.clear().await {
            warn!(%error, "failed to clear persisted session");
        }
        self.emit(AuthEvent::SignedOut);
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Other(format!("invalid backend url for {path}: {e}")))
    }

    fn token_url(&self, grant_type: &str) -> Result<Url, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(url)
    }

    fn table_url(&self, table: &str, filters: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self.endpoint("rest/v1/")?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Other("backend url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(table);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (column, filter) in filters {
                query.append_pair(column, filter);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl AuthBackend for BackendClient {
    async fn fetch_current_session(&self) -> Result<Option<Session>, BackendError> {
        let session = match self.stored_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(error) => {
                warn!(%error, "discarding unreadable persisted session");
                self.discard_session().await;
                return Err(error);
            }
        };

        if !session.is_expired(self.clock.now_epoch_seconds()) {
            return Ok(Some(session));
        }

        debug!("persisted session expired; refreshing");
        match self.refresh_with(&session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            // Keep the session when the backend was unreachable; a later refresh may succeed.
            Err(error @ BackendError::Transport(_)) => Err(error),
            Err(error) => {
                warn!(%error, "discarding persisted session after failed refresh");
                self.discard_session().await;
                Err(error)
            }
        }
    }

    fn auth_events(&self) -> BoxStream<'static, AuthEvent> {
        let events_rx = self.events_tx.subscribe();
        stream::unfold(events_rx, |mut events_rx| async move {
            loop {
                match events_rx.recv().await {
                    Ok(event) => return Some((event, events_rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "auth event subscriber lagged; continuing");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

fn session_missing() -> BackendError {
    BackendError::auth(
        AuthErrorKind::Other("session_missing".to_string()),
        "no active session",
    )
}

fn transport(error: reqwest::Error) -> BackendError {
    BackendError::Transport(error.to_string())
}

async fn send_checked(request: RequestBuilder) -> Result<Response, BackendError> {
    request.send().await.map_err(transport)
}

async fn auth_failure(response: Response) -> BackendError {
    let status = response.status().as_u16();
    // Keep upstream status/message even when the body is not the expected shape.
    let body = response.json::<AuthErrorBody>().await.unwrap_or_default();
    body.into_backend_error(status)
}

async fn send_auth<T>(request: RequestBuilder) -> Result<T, BackendError>
where
    T: DeserializeOwned,
{
    let response = send_checked(request).await?;
    if !response.status().is_success() {
        return Err(auth_failure(response).await);
    }

    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Other(format!("failed to decode auth response: {e}")))
}

async fn send_auth_empty(request: RequestBuilder) -> Result<(), BackendError> {
    let response = send_checked(request).await?;
    if !response.status().is_success() {
        return Err(auth_failure(response).await);
    }
    Ok(())
}

async fn send_database<T>(request: RequestBuilder) -> Result<T, BackendError>
where
    T: DeserializeOwned,
{
    let response = send_checked(request).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(match response.json::<DatabaseErrorBody>().await {
            Ok(body) => body.into(),
            Err(_) => BackendError::Other(format!(
                "database request failed with status {}",
                status.as_u16()
            )),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Other(format!("failed to decode database response: {e}")))
}
