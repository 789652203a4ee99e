// Configuration for one CLI invocation.
//
// Values come from three layers, later ones winning: an optional JSON file
// (by default `~/.rest-courier.json`), `COURIER_*` environment variables,
// and whatever the command line sets on the returned `Config`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Retries after the first attempt when nothing else is configured.
pub const HTTP_MAX_RETRIES: u32 = 30;
/// Seconds between retries when nothing else is configured.
pub const DEFAULT_WAIT_SECONDS: u64 = 60;

pub const CONFIG_FILE_NAME: &str = ".rest-courier.json";

pub const ENV_SERVER: &str = "COURIER_SERVER";
pub const ENV_USER: &str = "COURIER_USER";
pub const ENV_APITOKEN: &str = "COURIER_APITOKEN";
pub const ENV_WAIT_SECONDS: &str = "COURIER_WAIT_SECONDS";
pub const ENV_MAX_RETRIES: &str = "COURIER_MAX_RETRIES";
pub const ENV_DEBUG: &str = "COURIER_DEBUG";
pub const ENV_TIMEOUT_SECONDS: &str = "COURIER_TIMEOUT_SECONDS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("missing {0}")]
    Missing(&'static str),
}

/// Shape of the JSON config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub user: Option<String>,
    pub apitoken: Option<String>,
    pub wait_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub debug: Option<bool>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: Option<String>,
    pub user: String,
    pub api_token: String,
    pub wait_seconds: u64,
    pub max_retries: u32,
    pub debug: bool,
    pub timeout_seconds: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: None,
            user: String::new(),
            api_token: String::new(),
            wait_seconds: DEFAULT_WAIT_SECONDS,
            max_retries: HTTP_MAX_RETRIES,
            debug: false,
            timeout_seconds: None,
        }
    }
}

/// `~/.rest-courier.json`, or the working directory if there is no home.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

impl Config {
    /// Load `path` (required to exist when given) or the default file (used
    /// only if it exists), then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(read_file(path)?),
            None => {
                let path = default_config_path();
                if path.is_file() {
                    Some(read_file(&path)?)
                } else {
                    None
                }
            }
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(file: Option<FileConfig>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let mut config = Config {
            server: file.server,
            user: file.user.unwrap_or_default(),
            api_token: file.apitoken.unwrap_or_default(),
            wait_seconds: file.wait_seconds.unwrap_or(DEFAULT_WAIT_SECONDS),
            max_retries: file.max_retries.unwrap_or(HTTP_MAX_RETRIES),
            debug: file.debug.unwrap_or(false),
            timeout_seconds: file.timeout_seconds,
        };

        if let Some(server) = env(ENV_SERVER) {
            config.server = Some(server);
        }
        if let Some(user) = env(ENV_USER) {
            config.user = user;
        }
        if let Some(token) = env(ENV_APITOKEN) {
            config.api_token = token;
        }
        if let Some(wait) = env(ENV_WAIT_SECONDS) {
            config.wait_seconds = parse_number(ENV_WAIT_SECONDS, &wait)?;
        }
        if let Some(retries) = env(ENV_MAX_RETRIES) {
            config.max_retries = parse_number(ENV_MAX_RETRIES, &retries)?;
        }
        if let Some(debug) = env(ENV_DEBUG) {
            config.debug = parse_flag(ENV_DEBUG, &debug)?;
        }
        if let Some(timeout) = env(ENV_TIMEOUT_SECONDS) {
            config.timeout_seconds = Some(parse_number(ENV_TIMEOUT_SECONDS, &timeout)?);
        }

        Ok(config)
    }

    /// User and token are required before any request goes out.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("user (COURIER_USER)"));
        }
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("api token (COURIER_APITOKEN)"));
        }
        Ok(())
    }

    /// Join `path` onto the configured server, or return `path` unchanged if
    /// it is already absolute or no server is configured.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.server {
            Some(server) => format!(
                "{}/{}",
                server.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
