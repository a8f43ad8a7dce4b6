use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod config;
pub mod inventory;
pub mod topology;

pub use config::{ClientConfig, ConfigError};
pub use inventory::{Inventory, InventoryError, InventoryInstance};
pub use topology::{Member, ReplicasetSnapshot, ReplicasetStatus, Topology};

/// Result record reported for every administrative operation.
///
/// Fields are private so the invariants hold for every value in circulation:
/// a failure always carries a message, and only a success may be `changed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    success: bool,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Outcome {
    /// Successful read or no-op.
    pub fn unchanged(payload: Option<Value>) -> Self {
        Self {
            success: true,
            changed: false,
            message: None,
            payload,
        }
    }

    /// Successful operation that mutated cluster state.
    pub fn changed(payload: Option<Value>) -> Self {
        Self {
            success: true,
            changed: true,
            message: None,
            payload,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            changed: false,
            message: Some(message.into()),
            payload: None,
        }
    }

    /// Attach a payload to a failure, e.g. the health details of an unhealthy instance.
    pub fn failed_with(message: impl Into<String>, payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::failed(message)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid instance URI '{uri}': {reason}")]
pub struct UriError {
    pub uri: String,
    pub reason: &'static str,
}

/// Resolved address of a single cluster instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdentity {
    name: String,
    address: String,
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control_socket: Option<PathBuf>,
}

impl InstanceIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            control_socket: None,
        }
    }

    /// Parse an advertise URI (`host:port`, `[v6]:port`) into an identity.
    pub fn from_uri(name: impl Into<String>, uri: &str) -> Result<Self, UriError> {
        let (host, port) = split_uri(uri)?;
        Ok(Self::new(name, host, port))
    }

    pub fn with_control_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_socket = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn control_socket(&self) -> Option<&Path> {
        self.control_socket.as_deref()
    }

    pub fn advertise_uri(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.advertise_uri())
    }
}

/// Split `host:port` into its parts. Credentials before `@` are ignored.
pub fn split_uri(uri: &str) -> Result<(String, u16), UriError> {
    let invalid = |reason| UriError {
        uri: uri.to_string(),
        reason,
    };

    let trimmed = uri.trim();
    let without_auth = trimmed.rsplit_once('@').map_or(trimmed, |(_, rest)| rest);
    let (host, port) = without_auth
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("host is empty"));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| invalid("port is not a number in 1..=65535"))?;
    if port == 0 {
        return Err(invalid("port is not a number in 1..=65535"));
    }
    Ok((host.to_string(), port))
}

/// Session authentication settings of the admin HTTP surface.
///
/// Every field is optional: a value of `None` means "leave as is" when editing
/// and "not reported" when reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_max_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_renew_age: Option<u64>,
}

impl AuthParams {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.cookie_max_age.is_none() && self.cookie_renew_age.is_none()
    }

    /// True when every field set on `self` has the same value in `current`.
    pub fn is_satisfied_by(&self, current: &AuthParams) -> bool {
        fn same<T: PartialEq>(wanted: &Option<T>, current: &Option<T>) -> bool {
            wanted.as_ref().map_or(true, |w| current.as_ref() == Some(w))
        }

        same(&self.enabled, &current.enabled)
            && same(&self.cookie_max_age, &current.cookie_max_age)
            && same(&self.cookie_renew_age, &current.cookie_renew_age)
    }

    /// Keep only the fields that are set on `mask`.
    pub fn project(&self, mask: &AuthParams) -> AuthParams {
        AuthParams {
            enabled: mask.enabled.and(self.enabled),
            cookie_max_age: mask.cookie_max_age.and(self.cookie_max_age),
            cookie_renew_age: mask.cookie_renew_age.and(self.cookie_renew_age),
        }
    }
}
