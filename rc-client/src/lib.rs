//! Remote-command client.
//!
//! Opens an authenticated WebSocket session to a command server, sends one
//! command, and returns the server's response.
//!
//! # Connection Lifecycle
//!
//! - **Sign First**: every attempt asks the [`Signer`] for a fresh
//!   authorization header before a socket is opened. A signing failure ends
//!   the call; it is never retried.
//! - **Retry Only Failed Opens**: a socket that never opened is retried up to
//!   the configured budget. A socket that opened and then closed is final,
//!   even if no data was received.
//! - **One Request, One Connection**: the session that answered a request is
//!   closed as soon as the response arrives.
//! - **One Call at a Time**: concurrent calls on one [`Client`] are rejected
//!   with [`ClientError::RequestInFlight`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod auth;
pub mod client;
pub mod config;
pub mod duplex;
pub mod error;
pub mod event;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use auth::AuthGate;
pub use client::Client;
pub use config::{ClientConfig, TransportOptions};
pub use duplex::DuplexStream;
pub use error::ClientError;
pub use event::ClientEvent;
pub use reconnect::{AttemptOutcome, Decision, ReconnectController};
pub use session::{SessionCloser, TransportSession};
pub use transport::{
    OpenRequest, Payload, Socket, SocketCommand, SocketDriver, Transport, TransportEvent,
    WsTransport,
};

pub use rc_protocol::{
    AuthError, Command, KeyFileSigner, ProtocolError, Response, SessionState, Signer,
};
