//! Shared fixtures: scripted transports and fixed signers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use rc_client::{
    AuthError, ClientConfig, ClientEvent, OpenRequest, Payload, Signer, Socket, SocketCommand,
    SocketDriver, Transport, TransportEvent,
};
use tokio::sync::broadcast;

/// How one socket behaves.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report an error, then close without opening.
    FailToOpen(&'static str),
    /// Close without opening and without an error.
    SilentFail,
    /// Report an error after this many milliseconds, then close without
    /// opening. Closes early if the client asks.
    SlowFail(u64, &'static str),
    /// Open, then close immediately.
    OpenThenClose,
    /// Open, reply to the first send with this text, wait for close.
    Reply(String),
    /// Open, reply to the first send with these bytes, wait for close.
    ReplyBinary(Vec<u8>),
    /// Open, echo the first send back, wait for close.
    Echo,
    /// Open, push this text unprompted, then behave like `Echo`.
    PushThenEcho(String),
    /// Open, report an error, then close.
    ErrorAfterOpen(&'static str),
    /// Open and wait for the client to close.
    Hang,
}

/// Transport that plays one `Script` per open, in order.
///
/// Runs out of scripts → every further open fails.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    scripts: Mutex<VecDeque<Script>>,
    opens: AtomicUsize,
    requests: Mutex<Vec<OpenRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let transport = Self::default();
        transport
            .inner
            .scripts
            .lock()
            .unwrap()
            .extend(scripts);
        transport
    }

    /// Number of sockets opened so far.
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<OpenRequest> {
        self.inner.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, request: OpenRequest) -> Socket {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.requests.lock().unwrap().push(request);
        let script = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::FailToOpen("no more scripts"));

        let (socket, driver) = Socket::pair();
        tokio::spawn(play(script, driver));
        socket
    }
}

async fn play(script: Script, mut driver: SocketDriver) {
    match script {
        Script::FailToOpen(err) => {
            driver.emit(TransportEvent::Error(err.to_string())).await;
        }
        Script::SilentFail => {}
        Script::SlowFail(ms, err) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                    driver.emit(TransportEvent::Error(err.to_string())).await;
                }
                _ = driver.next_command() => {}
            }
        }
        Script::OpenThenClose => {
            driver.emit(TransportEvent::Open).await;
        }
        Script::Reply(text) => {
            driver.emit(TransportEvent::Open).await;
            if first_send(&mut driver).await.is_some() {
                driver
                    .emit(TransportEvent::Message(Payload::Text(text)))
                    .await;
                wait_for_close(&mut driver).await;
            }
        }
        Script::ReplyBinary(bytes) => {
            driver.emit(TransportEvent::Open).await;
            if first_send(&mut driver).await.is_some() {
                driver
                    .emit(TransportEvent::Message(Payload::Binary(bytes)))
                    .await;
                wait_for_close(&mut driver).await;
            }
        }
        Script::Echo => {
            driver.emit(TransportEvent::Open).await;
            echo(&mut driver).await;
        }
        Script::PushThenEcho(text) => {
            driver.emit(TransportEvent::Open).await;
            driver
                .emit(TransportEvent::Message(Payload::Text(text)))
                .await;
            echo(&mut driver).await;
        }
        Script::ErrorAfterOpen(err) => {
            driver.emit(TransportEvent::Open).await;
            driver.emit(TransportEvent::Error(err.to_string())).await;
        }
        Script::Hang => {
            driver.emit(TransportEvent::Open).await;
            wait_for_close(&mut driver).await;
        }
    }
    driver.emit(TransportEvent::Close).await;
}

/// Send the first payload back, then wait for close.
async fn echo(driver: &mut SocketDriver) {
    if let Some(sent) = first_send(driver).await {
        driver
            .emit(TransportEvent::Message(Payload::Text(sent)))
            .await;
        wait_for_close(driver).await;
    }
}

/// First payload sent by the client, `None` if it closed first.
async fn first_send(driver: &mut SocketDriver) -> Option<String> {
    match driver.next_command().await {
        Some(SocketCommand::Send(payload)) => Some(payload),
        _ => None,
    }
}

async fn wait_for_close(driver: &mut SocketDriver) {
    while let Some(command) = driver.next_command().await {
        if command == SocketCommand::Close {
            break;
        }
    }
}

/// Signer returning `<key_name>:<signature>` and counting calls.
#[derive(Clone, Default)]
pub struct StaticSigner {
    calls: Arc<AtomicUsize>,
}

impl StaticSigner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Signer for StaticSigner {
    fn sign<'a>(
        &'a self,
        key_name: &'a str,
        _key_dir: &'a Path,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(format!("{key_name}:sig-{n}")) })
    }
}

/// Signer that always fails.
pub struct FailingSigner;

impl Signer for FailingSigner {
    fn sign<'a>(
        &'a self,
        _key_name: &'a str,
        _key_dir: &'a Path,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        Box::pin(async { Err(AuthError::provider("key rejected")) })
    }
}

/// Config pointing at a fake host.
pub fn config(retry: u32) -> ClientConfig {
    ClientConfig::default()
        .with_host("h")
        .with_port(4515)
        .with_key_name("ops")
        .with_key_dir("/keys")
        .with_retry(retry)
}

/// Everything buffered on an event receiver.
pub fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Only the retry events, as `(attempt, budget)`.
pub fn retries(events: &[ClientEvent]) -> Vec<(u32, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Retry { attempt, budget } => Some((*attempt, *budget)),
            _ => None,
        })
        .collect()
}
