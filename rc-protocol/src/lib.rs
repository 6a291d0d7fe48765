//! Remote-command protocol core.
//!
//! This crate provides:
//! - The wire envelope for outbound commands and the decoder for inbound
//!   responses (JSON text or binary frames)
//! - The client-side session lifecycle state machine
//! - The request-signing seam and the default key-file signer
//!
//! # Invariants
//!
//! - A `Response` is always a JSON object; anything else is a decode error
//! - Session state only moves along the documented transitions
//! - Key material is zeroized as soon as the signature is computed

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod auth;
pub mod error;
pub mod message;
pub mod state;

pub use auth::{KeyFileSigner, Signer};
pub use error::{AuthError, ProtocolError};
pub use message::{Command, Response};
pub use state::{SessionLifecycle, SessionState};
