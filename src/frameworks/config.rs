use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fmt, time::Duration};
use url::Url;

// Runtime configuration. Environment variables win over the optional TOML file.

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:54321";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SESSION_FILE: &str = ".session.json";
const DEFAULT_UPDATE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: Url,
    pub anon_key: String,
    pub request_timeout: Duration,
    pub session_file: PathBuf,
    pub update_capacity: usize,
}

// Shape of the optional `BACKEND_CONFIG` file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    backend_url: Option<String>,
    anon_key: Option<String>,
    timeout_ms: Option<u64>,
    session_file: Option<PathBuf>,
    update_capacity: Option<usize>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, error: std::io::Error },
    Parse(toml::de::Error),
    InvalidUrl { value: String, error: url::ParseError },
    InvalidNumber { key: &'static str, value: String },
    MissingAnonKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, error } => {
                write!(f, "failed to read config file {}: {error}", path.display())
            }
            ConfigError::Parse(error) => write!(f, "invalid config file: {error}"),
            ConfigError::InvalidUrl { value, error } => {
                write!(f, "invalid backend url {value:?}: {error}")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got {value:?}")
            }
            ConfigError::MissingAnonKey => write!(f, "BACKEND_ANON_KEY must be set"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Loads configuration from `BACKEND_CONFIG` (if set) and the environment.
pub fn load() -> Result<AppConfig, ConfigError> {
    let file = match env::var("BACKEND_CONFIG") {
        Ok(path) => Some(read_file(Path::new(&path))?),
        Err(_) => None,
    };
    from_sources(file.as_deref(), |key| env::var(key).ok())
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: path.to_path_buf(),
        error,
    })
}

/// Builds the configuration from TOML text and an environment lookup.
pub fn from_sources(
    file: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let file: FileConfig = match file {
        Some(raw) => toml::from_str(raw).map_err(ConfigError::Parse)?,
        None => FileConfig::default(),
    };

    let raw_url = lookup("BACKEND_URL")
        .or(file.backend_url)
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    let backend_url = parse_base_url(&raw_url)?;

    let anon_key = lookup("BACKEND_ANON_KEY")
        .or(file.anon_key)
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingAnonKey)?;

    let timeout_ms = match lookup("BACKEND_TIMEOUT_MS") {
        Some(value) => parse_number("BACKEND_TIMEOUT_MS", &value)?,
        None => file.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
    };

    let update_capacity = match lookup("MIRROR_UPDATE_CAPACITY") {
        Some(value) => parse_number("MIRROR_UPDATE_CAPACITY", &value)?,
        None => file.update_capacity.unwrap_or(DEFAULT_UPDATE_CAPACITY),
    };

    let session_file = lookup("SESSION_FILE")
        .map(PathBuf::from)
        .or(file.session_file)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

    Ok(AppConfig {
        backend_url,
        anon_key,
        request_timeout: Duration::from_millis(timeout_ms),
        session_file,
        update_capacity,
    })
}

// Endpoint paths are joined onto the base, so it must end with a slash.
fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value).map_err(|error| ConfigError::InvalidUrl {
        value: value.to_string(),
        error,
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}
