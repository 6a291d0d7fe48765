//! Client errors.

use rc_protocol::{AuthError, ProtocolError};
use thiserror::Error;

/// Errors that can occur during client operations.
///
/// Every public operation reports its outcome exactly once through its
/// returned `Result`.
#[derive(Debug, Error)]
pub enum ClientError {
    // --- Setup ---
    /// Configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Signature provider failed. Never retried.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    // --- Connection ---
    /// Socket-level error reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// No attempt reached the open state and the retry budget is spent.
    #[error("connection failed after {attempts} attempt(s)")]
    ConnectFailed {
        /// Total number of opens attempted.
        attempts: u32,
    },

    /// Operation requires an open session.
    #[error("session is not connected")]
    NotConnected,

    /// The session opened, then closed before any response arrived.
    #[error("connection closed before a response arrived")]
    ClosedWithoutResponse,

    /// `disconnect()` ended the call before a socket opened.
    #[error("disconnected while connecting")]
    Disconnected,

    /// The stream already signalled end-of-stream.
    #[error("stream has already ended")]
    StreamEnded,

    // --- Protocol ---
    /// Malformed command or response, or an illegal lifecycle move.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Usage ---
    /// Another call is still running on this client.
    #[error("a request is already in flight on this client")]
    RequestInFlight,
}

impl ClientError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failed_reports_attempts() {
        let err = ClientError::ConnectFailed { attempts: 3 };
        assert_eq!(err.to_string(), "connection failed after 3 attempt(s)");
    }

    #[test]
    fn test_auth_error_converts() {
        let err: ClientError = AuthError::MissingKeyName.into();
        assert!(matches!(err, ClientError::Auth(AuthError::MissingKeyName)));
        assert!(err.to_string().contains("key name is empty"));
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: ClientError = ProtocolError::InvalidUtf8.into();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::InvalidUtf8)));
    }
}
