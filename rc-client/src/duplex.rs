//! Bidirectional message stream over a transport session.
//!
//! Writes connect lazily: the first `write` signs, opens, and retries failed
//! opens before sending. Reads yield each inbound frame as a parsed JSON
//! value, in arrival order, until the session's close is final.
//!
//! # Stream Invariants
//!
//! - At most one live session; every attempt builds a fresh one
//! - End-of-stream is one-way: once `read()` returns `None` it always does
//! - Inbound text and binary frames are both parsed as JSON
//! - Transport errors are yielded as items; only the close ends the stream

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rc_protocol::message::{parse_bytes, parse_text};
use rc_protocol::{Command, SessionLifecycle, SessionState};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::AuthGate;
use crate::config::{ClientConfig, TransportOptions};
use crate::error::ClientError;
use crate::event::{self, ClientEvent};
use crate::reconnect::{AttemptOutcome, Decision, ReconnectController};
use crate::session::{SessionCloser, TransportSession};
use crate::transport::{OpenRequest, Payload, Transport, TransportEvent};

/// State shared between a client and the stream it is currently running.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) events: broadcast::Sender<ClientEvent>,
    current: Mutex<Option<SessionCloser>>,
    session_ids: AtomicU64,
    cancelled: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            events: event::channel(),
            current: Mutex::new(None),
            session_ids: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Start a new call: forget any earlier cancellation.
    pub(crate) fn begin_call(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// End the running call: stop further connection attempts and close the
    /// live session, if any.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.close_current();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Close the live session, if any. Returns whether one existed.
    pub(crate) fn close_current(&self) -> bool {
        let slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(closer) => {
                closer.close();
                true
            }
            None => false,
        }
    }

    fn set_current(&self, closer: Option<SessionCloser>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = closer;
    }

    fn next_session_id(&self) -> u64 {
        self.session_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn publish(&self, event: ClientEvent) {
        event::publish(&self.events, event);
    }
}

/// Message stream for one call chain.
///
/// This type does not implement `Clone`; a stream owns its session.
pub struct DuplexStream {
    url: String,
    options: TransportOptions,
    retry: u32,
    gate: AuthGate,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    lifecycle: SessionLifecycle,
    controller: Option<ReconnectController>,
    session: Option<TransportSession>,
    ended: bool,
}

impl DuplexStream {
    pub(crate) fn new(
        config: &ClientConfig,
        gate: AuthGate,
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            url: config.url()?,
            options: config.transport.clone(),
            retry: config.retry,
            gate,
            transport,
            shared,
            lifecycle: SessionLifecycle::new(),
            controller: None,
            session: None,
            ended: false,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Whether a session is open right now.
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(TransportSession::is_connected)
    }

    /// Whether end-of-stream has been signalled.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Sign and open a session, retrying failed opens within the budget.
    ///
    /// Does nothing if a session is already open.
    ///
    /// # Errors
    ///
    /// - `Auth` if signing fails (no socket is opened, no retry)
    /// - `Disconnected` if the client disconnected before a socket opened
    /// - `Transport` with the last recorded error once retries are spent
    /// - `ConnectFailed` if retries are spent and no error was recorded
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.ended {
            return Err(ClientError::StreamEnded);
        }
        if self.is_connected() {
            return Ok(());
        }

        let mut controller = ReconnectController::new(self.retry);
        debug!(url = %self.url, budget = controller.budget(), "connecting");
        let mut last_error: Option<String> = None;

        loop {
            self.stop_if_cancelled()?;
            self.lifecycle.advance(SessionState::Authenticating)?;
            if let Err(e) = self.gate.authenticate(&mut self.options).await {
                warn!(error = %e, "authentication failed");
                self.lifecycle.close();
                return Err(e.into());
            }
            self.stop_if_cancelled()?;

            self.lifecycle.advance(SessionState::Connecting)?;
            let mut session = self.open_session();
            self.shared.set_current(Some(session.closer()));

            if self.await_open(&mut session).await && !self.shared.is_cancelled() {
                controller.observe(AttemptOutcome::Opened);
                self.lifecycle.advance(SessionState::Connected)?;
                info!(session = session.id(), url = %self.url, "connected");
                self.shared.publish(ClientEvent::Connect);
                self.session = Some(session);
                self.controller = Some(controller);
                return Ok(());
            }

            if let Some(e) = session.take_last_error() {
                last_error = Some(e);
            }
            drop(session);
            self.shared.set_current(None);
            self.lifecycle.close();
            self.shared.publish(ClientEvent::Close);
            self.stop_if_cancelled()?;

            let decision = controller.observe(AttemptOutcome::FailedBeforeOpen);
            let Decision::Retry { attempt, budget } = decision else {
                warn!(?decision, "connection failed, giving up");
                return Err(match last_error {
                    Some(e) => ClientError::Transport(e),
                    None => ClientError::ConnectFailed {
                        attempts: self.lifecycle.attempts_started(),
                    },
                });
            };

            warn!(attempt, budget, "connection failed, retrying");
            self.shared.publish(ClientEvent::Retry { attempt, budget });
        }
    }

    /// Send one command, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns `StreamEnded` after end-of-stream, any error from
    /// [`connect`](Self::connect), or `Protocol` if the command cannot be
    /// encoded.
    pub async fn write(&mut self, command: &Command) -> Result<(), ClientError> {
        if self.ended {
            return Err(ClientError::StreamEnded);
        }

        let payload = command.to_wire()?;
        self.connect().await?;

        let session = self.session.as_ref().ok_or(ClientError::NotConnected)?;
        debug!(session = session.id(), command = command.name(), "sending command");
        session.send(payload)
    }

    /// Next inbound item.
    ///
    /// Returns `None` at end-of-stream, or if nothing was ever written.
    pub async fn read(&mut self) -> Option<Result<Value, ClientError>> {
        if self.ended {
            return None;
        }

        loop {
            let session = self.session.as_mut()?;
            match session.next_event().await {
                Some(TransportEvent::Message(payload)) => return Some(decode(payload)),
                Some(TransportEvent::Error(e)) => {
                    self.shared.publish(ClientEvent::Error(e.clone()));
                    return Some(Err(ClientError::Transport(e)));
                }
                Some(TransportEvent::Open) => continue,
                Some(TransportEvent::Close) | None => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    /// Consume events that arrived while nobody was reading.
    ///
    /// Frames received without a pending request are dropped. Returns whether
    /// the session is still open afterwards.
    pub fn poll_idle(&mut self) -> bool {
        while let Some(event) = self.session.as_mut().and_then(TransportSession::poll_event) {
            match event {
                TransportEvent::Message(_) => debug!("unsolicited frame dropped"),
                TransportEvent::Error(e) => self.shared.publish(ClientEvent::Error(e)),
                TransportEvent::Open => {}
                TransportEvent::Close => {
                    self.finish();
                    break;
                }
            }
        }
        self.is_connected()
    }

    /// Ask the live session to close. Reads continue until the close arrives.
    pub fn close(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if self.lifecycle.state() == SessionState::Connected {
                let _ = self.lifecycle.advance(SessionState::Closing);
            }
            session.close();
        }
    }

    fn open_session(&mut self) -> TransportSession {
        let request = OpenRequest {
            url: self.url.clone(),
            headers: self.options.headers().clone(),
            accept_invalid_certs: self.options.accept_invalid_certs,
            connect_timeout: self.options.connect_timeout,
        };
        debug!(?request, "open request");
        TransportSession::open(
            self.transport.as_ref(),
            request,
            self.shared.next_session_id(),
        )
    }

    fn stop_if_cancelled(&mut self) -> Result<(), ClientError> {
        if self.shared.is_cancelled() {
            info!(url = %self.url, "disconnected while connecting");
            self.lifecycle.close();
            return Err(ClientError::Disconnected);
        }
        Ok(())
    }

    /// Drive a fresh session until it opens (`true`) or closes (`false`).
    async fn await_open(&self, session: &mut TransportSession) -> bool {
        while let Some(event) = session.next_event().await {
            match event {
                TransportEvent::Open => return true,
                TransportEvent::Error(e) => self.shared.publish(ClientEvent::Error(e)),
                TransportEvent::Message(_) => {
                    debug!(session = session.id(), "frame before open dropped");
                }
                TransportEvent::Close => return false,
            }
        }
        false
    }

    /// Terminal close: signal end-of-stream.
    fn finish(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            let decision = controller.observe(AttemptOutcome::ClosedAfterOpen);
            debug!(?decision, "session closed after open");
        }
        self.session = None;
        self.ended = true;
        self.lifecycle.close();
        self.shared.set_current(None);
        self.shared.publish(ClientEvent::Close);
    }
}

impl Drop for DuplexStream {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.shared.set_current(None);
        }
    }
}

impl std::fmt::Debug for DuplexStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexStream")
            .field("url", &self.url)
            .field("state", &self.lifecycle.state())
            .field("ended", &self.ended)
            .finish()
    }
}

fn decode(payload: Payload) -> Result<Value, ClientError> {
    let value = match payload {
        Payload::Text(text) => parse_text(&text)?,
        Payload::Binary(bytes) => parse_bytes(&bytes)?,
    };
    Ok(value)
}
