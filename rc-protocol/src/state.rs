//! Session lifecycle state machine.
//!
//! States: IDLE → AUTHENTICATING → CONNECTING → CONNECTED → CLOSING → CLOSED
//!
//! A failed attempt goes straight to CLOSED, and a new attempt starts again
//! from AUTHENTICATING. Any state may move to CLOSED.

use crate::error::ProtocolError;

/// Session state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No attempt has been made yet.
    Idle,
    /// Waiting on the signature provider.
    Authenticating,
    /// Socket open requested, not yet open.
    Connecting,
    /// Socket open, traffic may flow.
    Connected,
    /// Close requested, waiting for the close event.
    Closing,
    /// No live socket.
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle | Closed, Authenticating)
                | (Authenticating, Connecting)
                | (Connecting, Connected)
                | (Connected, Closing)
                | (_, Closed)
        )
    }
}

/// Tracks the state of the one live session of a call chain.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
    attempts_started: u32,
}

impl SessionLifecycle {
    /// Create a lifecycle in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            attempts_started: 0,
        }
    }

    /// Get current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of times `Authenticating` was entered.
    pub fn attempts_started(&self) -> u32 {
        self.attempts_started
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` and leaves the state unchanged if the
    /// move is not allowed.
    pub fn advance(&mut self, next: SessionState) -> Result<(), ProtocolError> {
        if !self.state.can_advance_to(next) {
            return Err(ProtocolError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == SessionState::Authenticating {
            self.attempts_started += 1;
        }
        self.state = next;
        Ok(())
    }

    /// Move to `Closed` from any state.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut lc = SessionLifecycle::new();
        assert_eq!(lc.state(), SessionState::Idle);

        lc.advance(SessionState::Authenticating).unwrap();
        lc.advance(SessionState::Connecting).unwrap();
        lc.advance(SessionState::Connected).unwrap();
        lc.advance(SessionState::Closing).unwrap();
        lc.advance(SessionState::Closed).unwrap();

        assert_eq!(lc.state(), SessionState::Closed);
        assert_eq!(lc.attempts_started(), 1);
    }

    #[test]
    fn test_retry_path_restarts_from_closed() {
        let mut lc = SessionLifecycle::new();
        for _ in 0..3 {
            lc.advance(SessionState::Authenticating).unwrap();
            lc.advance(SessionState::Connecting).unwrap();
            lc.advance(SessionState::Closed).unwrap();
        }
        assert_eq!(lc.attempts_started(), 3);
    }

    #[test]
    fn test_auth_failure_closes() {
        let mut lc = SessionLifecycle::new();
        lc.advance(SessionState::Authenticating).unwrap();
        lc.advance(SessionState::Closed).unwrap();
        assert_eq!(lc.state(), SessionState::Closed);
    }

    #[test]
    fn test_cannot_skip_authentication() {
        let mut lc = SessionLifecycle::new();
        let err = lc.advance(SessionState::Connecting).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Connecting,
            }
        );
        assert_eq!(lc.state(), SessionState::Idle);
    }

    #[test]
    fn test_cannot_reauthenticate_while_connected() {
        let mut lc = SessionLifecycle::new();
        lc.advance(SessionState::Authenticating).unwrap();
        lc.advance(SessionState::Connecting).unwrap();
        lc.advance(SessionState::Connected).unwrap();
        assert!(lc.advance(SessionState::Authenticating).is_err());
        assert_eq!(lc.state(), SessionState::Connected);
    }

    #[test]
    fn test_closing_requires_connected() {
        assert!(!SessionState::Connecting.can_advance_to(SessionState::Closing));
        assert!(SessionState::Connected.can_advance_to(SessionState::Closing));
    }
}
