//! Event-driven socket transport.
//!
//! A [`Transport`] opens one socket per call and reports what happens to it
//! as a sequence of [`TransportEvent`]s:
//!
//! ```text
//! Open  Message*  Close        (socket opened)
//! Error*  Close                (socket never opened)
//! ```
//!
//! `Error` events may be interleaved anywhere before `Close`. Exactly one
//! `Close` ends every socket, and nothing follows it.
//!
//! # Frame Handling Invariants
//!
//! - Strict 1:1 mapping: one WS text/binary message = one `Message` event
//! - Each `SocketCommand::Send` = exactly one `ws.send(Text(...))`
//! - Ping/Pong frames are answered by tungstenite and never surfaced

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::protocol::Message as WsMessage, Connector,
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

/// Events buffered per socket before the transport waits on the reader.
const EVENT_BUFFER: usize = 64;

/// Payload of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

/// Something that happened to a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket is open and may carry traffic.
    Open,
    /// A frame arrived.
    Message(Payload),
    /// Socket-level error. Does not end the socket by itself.
    Error(String),
    /// Socket is gone. Always the last event.
    Close,
}

/// Request from the client to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    /// Send one text frame.
    Send(String),
    /// Close the socket.
    Close,
}

/// Everything a transport needs to open one socket.
#[derive(Clone)]
pub struct OpenRequest {
    /// Server URL.
    pub url: String,
    /// Handshake headers, including `authorization`.
    pub headers: BTreeMap<String, String>,
    /// Accept unverifiable server certificates.
    pub accept_invalid_certs: bool,
    /// Optional bound on the open handshake.
    pub connect_timeout: Option<Duration>,
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest")
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Client side of one socket: its events and its command channel.
#[derive(Debug)]
pub struct Socket {
    events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::UnboundedSender<SocketCommand>,
}

/// Transport side of one socket.
///
/// Dropping the driver without emitting `Close` is read as a close.
#[derive(Debug)]
pub struct SocketDriver {
    events: mpsc::Sender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
}

impl Socket {
    /// Create a connected socket/driver pair.
    pub fn pair() -> (Socket, SocketDriver) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            Socket {
                events: event_rx,
                commands: command_tx,
            },
            SocketDriver {
                events: event_tx,
                commands: command_rx,
            },
        )
    }

    /// Wait for the next event. `None` once the driver is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued, without waiting.
    ///
    /// A driver that went away reads as `Close`.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(TransportEvent::Close),
        }
    }

    /// Queue a command. Returns `false` if the driver is gone.
    pub fn command(&self, command: SocketCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// A handle that can only close this socket.
    pub(crate) fn closer(&self) -> mpsc::UnboundedSender<SocketCommand> {
        self.commands.clone()
    }
}

impl SocketDriver {
    /// Report an event. Returns `false` if the client side is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Wait for the next command. `None` once the client side is gone.
    pub async fn next_command(&mut self) -> Option<SocketCommand> {
        self.commands.recv().await
    }
}

/// Opens sockets.
///
/// `open` must return immediately; the socket reports its progress through
/// events. Implementations must be called from within a tokio runtime.
pub trait Transport: Send + Sync {
    /// Open one socket.
    fn open(&self, request: OpenRequest) -> Socket;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl WsTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    fn open(&self, request: OpenRequest) -> Socket {
        let (socket, driver) = Socket::pair();
        tokio::spawn(run_socket(request, driver));
        socket
    }
}

/// Drive one WebSocket from handshake to close.
async fn run_socket(request: OpenRequest, mut driver: SocketDriver) {
    // Nothing but a close can be queued before Open.
    let ws = tokio::select! {
        result = handshake(&request) => match result {
            Ok(ws) => ws,
            Err(e) => {
                driver.emit(TransportEvent::Error(e)).await;
                driver.emit(TransportEvent::Close).await;
                return;
            }
        },
        _ = driver.next_command() => {
            debug!(url = %request.url, "closed during handshake");
            driver.emit(TransportEvent::Close).await;
            return;
        }
    };

    if !driver.emit(TransportEvent::Open).await {
        return;
    }

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            command = driver.next_command() => match command {
                Some(SocketCommand::Send(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        driver.emit(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    // Best effort close frame
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    driver.emit(TransportEvent::Message(Payload::Text(text))).await;
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    driver.emit(TransportEvent::Message(Payload::Binary(data))).await;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "server closed socket");
                    break;
                }
                Some(Ok(_)) => continue, // Ping, Pong, raw frames
                Some(Err(e)) => {
                    driver.emit(TransportEvent::Error(e.to_string())).await;
                    break;
                }
                None => break,
            },
        }
    }

    driver.emit(TransportEvent::Close).await;
}

/// Build the upgrade request and complete the WebSocket handshake.
async fn handshake(request: &OpenRequest) -> Result<WsStream, String> {
    let mut ws_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| e.to_string())?;

    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("invalid header name {name:?}: {e}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| format!("invalid value for {name}: {e}"))?;
        ws_request.headers_mut().insert(name, value);
    }

    let connector = if request.accept_invalid_certs && request.url.starts_with("wss://") {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| e.to_string())?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let connecting = connect_async_tls_with_config(ws_request, None, false, connector);
    let result = match request.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| format!("connect timed out after {}ms", limit.as_millis()))?,
        None => connecting.await,
    };

    let (ws, _response) = result.map_err(|e| e.to_string())?;
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_request_debug_hides_header_values() {
        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), "ops:1:cafe".to_string());
        let request = OpenRequest {
            url: "wss://h:4515".into(),
            headers,
            accept_invalid_certs: true,
            connect_timeout: None,
        };
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("authorization"));
        assert!(!rendered.contains("cafe"));
    }

    #[tokio::test]
    async fn test_socket_pair_round_trip() {
        let (mut socket, mut driver) = Socket::pair();

        assert!(socket.command(SocketCommand::Send("hi".into())));
        assert_eq!(
            driver.next_command().await,
            Some(SocketCommand::Send("hi".into()))
        );

        assert!(driver.emit(TransportEvent::Open).await);
        assert_eq!(socket.recv().await, Some(TransportEvent::Open));

        drop(driver);
        assert_eq!(socket.recv().await, None);
        assert!(!socket.command(SocketCommand::Close));
    }

    #[tokio::test]
    async fn test_try_recv_does_not_wait() {
        let (mut socket, driver) = Socket::pair();
        assert_eq!(socket.try_recv(), None);

        driver.emit(TransportEvent::Open).await;
        assert_eq!(socket.try_recv(), Some(TransportEvent::Open));

        drop(driver);
        assert_eq!(socket.try_recv(), Some(TransportEvent::Close));
    }

    #[tokio::test]
    async fn test_close_during_handshake_ends_socket() {
        // Accepts TCP but never answers the upgrade.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let mut socket = WsTransport::new().open(OpenRequest {
            url: format!("ws://127.0.0.1:{port}"),
            headers: BTreeMap::new(),
            accept_invalid_certs: false,
            connect_timeout: None,
        });
        assert!(socket.command(SocketCommand::Close));

        let event = tokio::time::timeout(Duration::from_secs(5), socket.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(TransportEvent::Close));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error_then_close() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut socket = WsTransport::new().open(OpenRequest {
            url: format!("ws://127.0.0.1:{port}"),
            headers: BTreeMap::new(),
            accept_invalid_certs: false,
            connect_timeout: Some(Duration::from_secs(5)),
        });

        assert!(matches!(socket.recv().await, Some(TransportEvent::Error(_))));
        assert_eq!(socket.recv().await, Some(TransportEvent::Close));
    }

    #[tokio::test]
    async fn test_invalid_header_fails_before_open() {
        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), "bad\nvalue".to_string());

        let mut socket = WsTransport::new().open(OpenRequest {
            url: "ws://127.0.0.1:1".into(),
            headers,
            accept_invalid_certs: false,
            connect_timeout: None,
        });

        match socket.recv().await {
            Some(TransportEvent::Error(msg)) => assert!(msg.contains("authorization")),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(socket.recv().await, Some(TransportEvent::Close));
    }
}
