//! Lifecycle notifications.

use tokio::sync::broadcast;

/// Buffered events per subscriber before old ones are dropped.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Observable side channel of a [`Client`](crate::Client).
///
/// Events are informational; the outcome of a call is always its returned
/// `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A socket opened.
    Connect,
    /// A socket failed to open and another attempt is starting.
    Retry {
        /// 1-based retry number.
        attempt: u32,
        /// Configured retry budget.
        budget: u32,
    },
    /// A transport error was reported.
    Error(String),
    /// A socket closed.
    Close,
}

/// Sending half shared by a client and its streams.
pub(crate) fn channel() -> broadcast::Sender<ClientEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

/// Publish an event. Having no subscribers is not an error.
pub(crate) fn publish(events: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    let _ = events.send(event);
}
