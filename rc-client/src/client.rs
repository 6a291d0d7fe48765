//! Request/response client.
//!
//! The main public interface: one command in, one response out, one
//! connection attempt chain per request.

use std::sync::Arc;

use rc_protocol::{Command, KeyFileSigner, Response, Signer};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::auth::AuthGate;
use crate::config::ClientConfig;
use crate::duplex::{DuplexStream, Shared};
use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::transport::{Transport, WsTransport};

/// Remote-command client.
///
/// A client runs one call at a time. It can be shared (e.g. in an `Arc`)
/// so that [`disconnect`](Client::disconnect) can be called while a request
/// is in flight, but a second concurrent `send` or `connect` is rejected
/// with [`ClientError::RequestInFlight`].
pub struct Client {
    config: ClientConfig,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    /// Stream parked by `connect()`. Locked for the duration of every call.
    slot: Mutex<Option<DuplexStream>>,
}

impl Client {
    /// Create a client using the key-file signer and the WebSocket transport.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            signer: Arc::new(KeyFileSigner::new()),
            transport: Arc::new(WsTransport::new()),
            shared: Arc::new(Shared::new()),
            slot: Mutex::new(None),
        }
    }

    /// Replace the signature provider.
    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    /// Replace the transport.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Establish and authenticate a session without sending anything.
    ///
    /// The session is kept and used by the next [`send`](Client::send).
    /// Calling this while a session is already open does nothing.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut slot = self.slot.try_lock().map_err(|_| ClientError::RequestInFlight)?;
        self.shared.begin_call();

        if slot.as_mut().is_some_and(|parked| parked.poll_idle()) {
            return Ok(());
        }

        let mut stream = self.stream()?;
        stream.connect().await?;
        *slot = Some(stream);
        Ok(())
    }

    /// Send `command` with `options` and wait for its response.
    ///
    /// The first inbound message becomes the response; the session is then
    /// closed. A transport error seen before the response fails the call.
    ///
    /// # Errors
    ///
    /// - `RequestInFlight` if another call is running on this client
    /// - `Auth` if signing fails
    /// - `Transport` / `ConnectFailed` if no attempt could open a socket
    /// - `Disconnected` if [`disconnect`](Client::disconnect) ran while connecting
    /// - `Protocol` if the response is malformed
    /// - `ClosedWithoutResponse` if the socket closed before replying
    pub async fn send(
        &self,
        command: &str,
        options: Map<String, Value>,
    ) -> Result<Response, ClientError> {
        let mut slot = self.slot.try_lock().map_err(|_| ClientError::RequestInFlight)?;
        self.shared.begin_call();

        // A parked session the server has closed in the meantime is replaced.
        let parked = slot
            .take()
            .and_then(|mut parked| parked.poll_idle().then_some(parked));
        let mut stream = match parked {
            Some(parked) => parked,
            None => self.stream()?,
        };

        stream.write(&Command::with_options(command, options)).await?;

        let mut response: Option<Response> = None;
        let mut error: Option<ClientError> = None;
        let mut settled = false;

        // Read until the close, even once settled, so it is observed.
        while let Some(item) = stream.read().await {
            if settled {
                if let Err(e) = item {
                    debug!(error = %e, "error after completion ignored");
                }
                continue;
            }

            match item.and_then(|value| Response::from_value(value).map_err(Into::into)) {
                Ok(decoded) => {
                    response = Some(decoded);
                    settled = true;
                    stream.close();
                }
                Err(ClientError::Transport(e)) => {
                    // Recorded; the close that follows ends the call.
                    error.get_or_insert(ClientError::Transport(e));
                }
                Err(e) => {
                    error.get_or_insert(e);
                    settled = true;
                    stream.close();
                }
            }
        }

        match (error, response) {
            (Some(e), _) => Err(e),
            (None, Some(response)) => Ok(response),
            (None, None) => Err(ClientError::ClosedWithoutResponse),
        }
    }

    /// Close the current session.
    ///
    /// With no session this is a no-op. A call still connecting makes no
    /// further attempts and fails with [`ClientError::Disconnected`]; a call
    /// already connected ends with the error its closed session produces.
    pub fn disconnect(&self) {
        if let Ok(mut slot) = self.slot.try_lock() {
            if let Some(mut parked) = slot.take() {
                debug!("dropping parked session");
                parked.close();
            }
            return;
        }
        self.shared.cancel();
    }

    fn stream(&self) -> Result<DuplexStream, ClientError> {
        let gate = AuthGate::new(
            Arc::clone(&self.signer),
            self.config.key_name.clone(),
            self.config.key_dir.clone(),
        );
        DuplexStream::new(
            &self.config,
            gate,
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
        )
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
