//! Server error types.

use sigildb_core::ServiceError;
use sigildb_protocol::ProtocolError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("server shutting down")]
    ShuttingDown,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ServerError {
    /// Returns whether the failure indicates tampering rather than a
    /// malfunctioning peer; used to route security logging.
    pub fn is_security(&self) -> bool {
        matches!(self, ServerError::Protocol(e) if e.is_security())
    }
}
