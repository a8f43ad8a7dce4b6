use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ADMIN_URL: &str = "http://127.0.0.1:8081";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for an administration session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the control instance's HTTP server.
    pub admin_url: String,
    /// Console socket of the instance that local scripts are evaluated against.
    pub console_socket: Option<PathBuf>,
    pub timeout_secs: u64,
    pub username: Option<String>,
    /// Password or cluster cookie for HTTP basic auth.
    pub password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            admin_url: DEFAULT_ADMIN_URL.to_string(),
            console_socket: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            username: None,
            password: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Override fields from `CLUSTERCTL_*` environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = var("CLUSTERCTL_ADMIN_URL") {
            self.admin_url = url;
        }
        if let Some(socket) = var("CLUSTERCTL_CONSOLE_SOCKET") {
            self.console_socket = Some(PathBuf::from(socket));
        }
        if let Some(raw) = var("CLUSTERCTL_TIMEOUT_SECS") {
            self.timeout_secs = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "CLUSTERCTL_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
        }
        if let Some(username) = var("CLUSTERCTL_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = var("CLUSTERCTL_PASSWORD") {
            self.password = Some(password);
        }
        debug!(admin_url = %self.admin_url, "applied environment overrides");
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_url.trim().is_empty() {
            return Err(ConfigError::Invalid("admin_url must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::Invalid(
                "password is set but username is missing".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
