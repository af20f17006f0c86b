//! Error types for the connection manager and its transport.
//!
//! Two layers exist:
//!
//! - `TransportError`: failures reported by a transport client (setup, rejected
//!   requests, lost connections, publishes abandoned when the session ended).
//! - `ConnectionError`: the crate-level error returned by constructors and
//!   configuration conversions.
//!
//! The lifecycle operations themselves (`connect`, `disconnect`, `publish`) never
//! return these to the caller; they log them and converge to a stable state.

use thiserror::Error;

/// Failures reported by a transport client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client could not be built from the supplied connection info.
    ///
    /// Typical causes are an unusable TLS setup or malformed broker address.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// The client refused to queue a request (request channel closed or full).
    #[error("Client request error: {0}")]
    ClientRequest(#[from] rumqttc::ClientError),

    /// The network connection failed or was lost.
    ///
    /// Boxed to keep the enum small.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<rumqttc::ConnectionError>),

    /// The operation needs a running session but none exists.
    #[error("Not connected")]
    NotConnected,

    /// The session ended before the broker acknowledged the request.
    #[error("Request abandoned: {0}")]
    Abandoned(String),

    /// Any other transport-specific failure.
    #[error("Transport error: {0}")]
    Other(String),
}

impl From<rumqttc::ConnectionError> for TransportError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransportError::ClientConnection(Box::new(err))
    }
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// QoS ordinal outside 0..=2.
    #[error("Invalid QoS value: {0}, must be 0, 1, or 2")]
    InvalidQos(i32),

    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] validator::ValidationErrors),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ConnectionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_qos_display() {
        let err = ConnectionError::InvalidQos(3);
        assert_eq!(err.to_string(), "Invalid QoS value: 3, must be 0, 1, or 2");
    }

    #[test]
    fn test_transport_error_wraps_into_connection_error() {
        let err: ConnectionError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "Transport error: Not connected");
    }

    #[test]
    fn test_rumqttc_connection_error_is_boxed() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: TransportError = rumqttc::ConnectionError::Io(io).into();
        assert!(matches!(err, TransportError::ClientConnection(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_abandoned_debug() {
        let err = TransportError::Abandoned("session closed".into());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Abandoned"));
        assert!(debug_str.contains("session closed"));
    }
}
