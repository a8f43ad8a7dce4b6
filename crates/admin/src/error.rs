use common::{Outcome, UriError};
use thiserror::Error;
use transport::TransportError;

/// Failure taxonomy for administrative operations.
///
/// `Remote`, `Validation` and `NotFound` display their message verbatim so the
/// orchestrating runtime can report it unchanged.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The request never completed (unreachable, timeout, socket missing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Well-formed failure reported by the admin API or the console.
    #[error("{0}")]
    Remote(String),

    /// Malformed caller input, rejected before anything is sent.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),
}

impl AdminError {
    pub fn remote(message: impl Into<String>) -> Self {
        AdminError::Remote(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AdminError::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdminError::Transport(_) => "transport",
            AdminError::Remote(_) => "remote",
            AdminError::Validation(_) => "validation",
            AdminError::NotFound(_) => "not_found",
        }
    }
}

impl From<UriError> for AdminError {
    fn from(err: UriError) -> Self {
        AdminError::Validation(err.to_string())
    }
}

impl From<AdminError> for Outcome {
    fn from(err: AdminError) -> Self {
        Outcome::failed(err.to_string())
    }
}

pub type AdminResult<T> = std::result::Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn errors_become_failed_outcomes_verbatim() {
        let outcome: Outcome = AdminError::remote("boom").into();
        assert!(!outcome.is_success());
        assert_eq!(outcome.message(), Some("boom"));

        let outcome: Outcome = AdminError::Transport(TransportError::SocketMissing {
            path: PathBuf::from("/tmp/app.control"),
        })
        .into();
        assert_eq!(
            outcome.message(),
            Some("Control socket /tmp/app.control does not exist")
        );
    }

    #[test]
    fn uri_errors_are_validation_failures() {
        let err: AdminError = common::split_uri("nohost").unwrap_err().into();
        assert_eq!(err.kind(), "validation");
    }
}
