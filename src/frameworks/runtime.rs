// Framework bootstrap for the session mirror process.

use crate::domain::SessionStorage;
use crate::frameworks::config::{self, AppConfig};
use crate::interface_adapters::clients::BackendClient;
use crate::interface_adapters::storage::FileSessionStorage;
use crate::use_cases::{MirrorExit, MirrorSettings, MirrorState, SessionMirror};

use std::io::Result;
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};
use tracing::{error, info, warn};

fn init_runtime() {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Builds the backend client for `config`, persisting sessions to its session file.
pub fn build_client(config: &AppConfig) -> Result<BackendClient> {
    let storage: Arc<dyn SessionStorage> =
        Arc::new(FileSessionStorage::new(config.session_file.clone()));
    BackendClient::new(
        config.backend_url.clone(),
        config.anon_key.clone(),
        config.request_timeout,
        storage,
    )
    .map_err(|e| std::io::Error::other(format!("failed to initialize backend client: {e}")))
}

/// Mirrors the session held by `client` until `shutdown` fires or the event
/// stream ends. Every published state is logged.
pub async fn run(
    client: Arc<BackendClient>,
    settings: MirrorSettings,
    shutdown: Arc<Notify>,
) -> MirrorExit {
    let (mirror, task) = SessionMirror::new(settings);
    tokio::spawn(log_updates(mirror.updates()));

    let exit = task.run(client, shutdown).await;
    info!(
        ?exit,
        authenticated = mirror.is_authenticated(),
        "session mirror stopped"
    );
    exit
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let config = config::load().map_err(|e| {
        error!(error = %e, "invalid configuration");
        std::io::Error::other(e)
    })?;
    tracing::debug!(
        backend_url = %config.backend_url,
        request_timeout_ms = config.request_timeout.as_millis(),
        session_file = %config.session_file.display(),
        "backend client configured"
    );

    let client = Arc::new(build_client(&config)?);
    let settings = MirrorSettings {
        update_capacity: config.update_capacity,
    };

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => error!(error = %e, "failed to listen for ctrl-c; shutting down"),
        }
        signal.notify_one();
    });

    run(client, settings, shutdown).await;
    Ok(())
}

async fn log_updates(mut updates: broadcast::Receiver<MirrorState>) {
    loop {
        match updates.recv().await {
            Ok(state) => info!(
                initialized = state.initialized,
                authenticated = state.is_authenticated(),
                user_id = ?state.current_user_id(),
                "session state published"
            ),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "session update logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
