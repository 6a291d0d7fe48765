//! Protocol and signing errors.
//!
//! Decode errors are terminal for the request that produced them: the
//! session that delivered the payload is closed and the error is returned
//! to the caller. Signing errors abort the call before any socket exists.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::SessionState;

/// Errors raised while encoding commands, decoding responses, or moving
/// the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Outbound command has an empty name.
    #[error("command name is empty")]
    EmptyCommand,

    /// Outbound command could not be serialized.
    #[error("failed to encode command: {0}")]
    Encode(String),

    /// Inbound binary payload is not valid UTF-8.
    #[error("payload is not valid utf-8")]
    InvalidUtf8,

    /// Inbound payload is not valid JSON.
    #[error("payload is not valid json: {0}")]
    InvalidJson(String),

    /// Inbound payload parsed, but is not a JSON object.
    #[error("response payload must be a json object, got {0}")]
    NotAnObject(&'static str),

    /// Session lifecycle was asked to make a transition it does not allow.
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State the session was in.
        from: SessionState,
        /// State that was requested.
        to: SessionState,
    },
}

/// Errors from the signature provider.
///
/// None of these are retried: a bad key fails the call immediately.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No key name configured.
    #[error("key name is empty")]
    MissingKeyName,

    /// Key file could not be read.
    #[error("failed to read key file {path}: {source}")]
    KeyUnreadable {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Key file exists but holds no key material.
    #[error("key file {0} is empty")]
    EmptyKey(PathBuf),

    /// Any other failure reported by a signature provider.
    #[error("signature provider failed: {0}")]
    Provider(String),
}

impl AuthError {
    /// Create a provider error with the given message.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}
