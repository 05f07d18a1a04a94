//! Error types for the server client.

use thiserror::Error;

/// Errors returned by `FakedynClient` methods.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("server disconnected")]
    Disconnected,

    /// The engine rejected the operation.
    #[error("{kind} ({status}): {message}")]
    Service {
        status: u16,
        kind: String,
        message: String,
    },
}

impl ClientError {
    /// The exception name without its namespace, for service errors.
    pub fn kind(&self) -> Option<&str> {
        match self {
            ClientError::Service { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
