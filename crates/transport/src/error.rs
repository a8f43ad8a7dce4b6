use std::path::PathBuf;
use thiserror::Error;

/// Failures to complete a request, as opposed to a well-formed error response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("Request to {target} timed out")]
    Timeout { target: String },

    #[error("Control socket {} does not exist", path.display())]
    SocketMissing { path: PathBuf },

    #[error("Control socket is not configured")]
    ConsoleNotConfigured,

    #[error("{target} responded with HTTP {status}: {body}")]
    Status {
        target: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {target}: {reason}")]
    Protocol { target: String, reason: String },

    #[error("{transport} transport cannot send {payload} payloads")]
    Unsupported {
        transport: &'static str,
        payload: &'static str,
    },

    #[error("I/O error talking to {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    pub fn protocol(target: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::Protocol {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O failure, folding timeouts and refused connections into
    /// their dedicated variants.
    pub fn from_io(target: impl Into<String>, source: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let target = target.into();
        match source.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout { target },
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                TransportError::Unreachable {
                    target,
                    reason: source.to_string(),
                }
            }
            _ => TransportError::Io { target, source },
        }
    }

    /// True when the remote was never reached.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable { .. }
                | TransportError::SocketMissing { .. }
                | TransportError::ConsoleNotConfigured
        )
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
