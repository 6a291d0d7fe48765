//! One socket and its lifecycle signals.
//!
//! # Invariants
//!
//! - A `TransportSession` owns exactly one socket and is never reused
//! - `send()` is only valid between `Open` and `Close`
//! - `close()` is idempotent
//! - Transport errors are recorded; only `Close` ends the session
//! - `Drop` requests a close if one has not been requested yet

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::transport::{OpenRequest, Socket, SocketCommand, Transport, TransportEvent};

/// Handle that can close a session from outside the task driving it.
#[derive(Debug, Clone)]
pub struct SessionCloser(mpsc::UnboundedSender<SocketCommand>);

impl SessionCloser {
    /// Ask the socket to close. No effect if it is already gone.
    pub fn close(&self) {
        let _ = self.0.send(SocketCommand::Close);
    }
}

/// A single socket session.
///
/// This type does not implement `Clone` to prevent socket duplication.
#[derive(Debug)]
pub struct TransportSession {
    id: u64,
    socket: Socket,
    opened: bool,
    closed: bool,
    close_requested: bool,
    last_error: Option<String>,
}

impl TransportSession {
    /// Open a new socket through `transport`.
    pub fn open(transport: &dyn Transport, request: OpenRequest, id: u64) -> Self {
        debug!(session = id, url = %request.url, "opening socket");
        Self {
            id,
            socket: transport.open(request),
            opened: false,
            closed: false,
            close_requested: false,
            last_error: None,
        }
    }

    /// Session identifier, unique within one client.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the socket is open right now.
    pub fn is_connected(&self) -> bool {
        self.opened && !self.closed
    }

    /// Whether the socket reached the open state at any point.
    pub fn ever_opened(&self) -> bool {
        self.opened
    }

    /// Whether the close event has been seen.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Most recent transport error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Take the most recent transport error.
    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Handle for closing this session from elsewhere.
    pub fn closer(&self) -> SessionCloser {
        SessionCloser(self.socket.closer())
    }

    /// Send one text payload.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` before `Open` or after `Close`.
    pub fn send(&self, payload: String) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if !self.socket.command(SocketCommand::Send(payload)) {
            // Socket task already finished; its Close event is still queued.
            debug!(session = self.id, "socket gone before send, awaiting close");
        }
        Ok(())
    }

    /// Request the socket to close.
    ///
    /// This is idempotent (safe to call multiple times).
    pub fn close(&mut self) {
        if self.closed || self.close_requested {
            return;
        }
        self.close_requested = true;
        debug!(session = self.id, "close requested");
        self.socket.command(SocketCommand::Close);
    }

    /// Wait for the next event.
    ///
    /// Returns `None` after `Close` has been delivered. A transport that goes
    /// away without a `Close` event is reported as closed.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }

        let event = self.socket.recv().await.unwrap_or(TransportEvent::Close);
        Some(self.track(event))
    }

    /// Next event if one is already queued, without waiting.
    ///
    /// Returns `None` when nothing is pending or after `Close`.
    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        let event = self.socket.try_recv()?;
        Some(self.track(event))
    }

    fn track(&mut self, event: TransportEvent) -> TransportEvent {
        match &event {
            TransportEvent::Open => {
                if !self.opened {
                    self.opened = true;
                    debug!(session = self.id, "socket open");
                }
            }
            TransportEvent::Message(_) => {}
            TransportEvent::Error(e) => {
                warn!(session = self.id, error = %e, "transport error");
                self.last_error = Some(e.clone());
            }
            TransportEvent::Close => {
                self.closed = true;
                debug!(session = self.id, opened = self.opened, "socket closed");
            }
        }
        event
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}
