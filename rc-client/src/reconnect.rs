//! Retry decisions for failed opens.
//!
//! States: NOT_CONNECTED → CONNECTED → CLOSED_FINAL
//!
//! Only a socket that never opened is retried. Once a socket has opened,
//! its close is final for the call regardless of whether data flowed.
//! One controller lives for exactly one call chain; its attempt counter is
//! never shared between calls.

/// What happened to one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Socket reached the open state.
    Opened,
    /// Socket closed without ever opening.
    FailedBeforeOpen,
    /// Socket opened earlier and has now closed.
    ClosedAfterOpen,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep using the open socket.
    Proceed,
    /// Authenticate again and open a fresh socket.
    Retry {
        /// 1-based retry number.
        attempt: u32,
        /// Configured retry budget.
        budget: u32,
    },
    /// Socket closed after opening; signal end-of-stream.
    Finished,
    /// No open was ever achieved and the budget is spent.
    Exhausted {
        /// Total number of opens attempted.
        attempts: u32,
    },
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No socket has opened yet.
    NotConnected,
    /// A socket is open.
    Connected,
    /// The call chain is over.
    ClosedFinal,
}

/// Decides, per close, whether to try again.
#[derive(Debug)]
pub struct ReconnectController {
    budget: u32,
    attempts: u32,
    state: ReconnectState,
}

impl ReconnectController {
    /// Create a controller allowing `budget` retries. 0 never retries.
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            attempts: 0,
            state: ReconnectState::NotConnected,
        }
    }

    /// Retries used so far in this call chain.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured retry budget.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Current state.
    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// Feed the outcome of an attempt and get the next step.
    pub fn observe(&mut self, outcome: AttemptOutcome) -> Decision {
        match outcome {
            AttemptOutcome::Opened => {
                self.state = ReconnectState::Connected;
                Decision::Proceed
            }
            AttemptOutcome::ClosedAfterOpen => {
                self.attempts = 0;
                self.state = ReconnectState::ClosedFinal;
                Decision::Finished
            }
            AttemptOutcome::FailedBeforeOpen => {
                if self.budget > 0 && self.attempts < self.budget {
                    self.attempts += 1;
                    self.state = ReconnectState::NotConnected;
                    Decision::Retry {
                        attempt: self.attempts,
                        budget: self.budget,
                    }
                } else {
                    let attempts = self.attempts + 1;
                    self.attempts = 0;
                    self.state = ReconnectState::ClosedFinal;
                    Decision::Exhausted { attempts }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_never_retries() {
        let mut rc = ReconnectController::new(0);
        assert_eq!(
            rc.observe(AttemptOutcome::FailedBeforeOpen),
            Decision::Exhausted { attempts: 1 }
        );
        assert_eq!(rc.attempts(), 0);
        assert_eq!(rc.state(), ReconnectState::ClosedFinal);
    }

    #[test]
    fn test_budget_allows_n_plus_one_opens() {
        for budget in 0..5u32 {
            let mut rc = ReconnectController::new(budget);
            let mut opens = 0;
            loop {
                opens += 1;
                match rc.observe(AttemptOutcome::FailedBeforeOpen) {
                    Decision::Retry { attempt, budget: b } => {
                        assert_eq!(attempt, opens);
                        assert_eq!(b, budget);
                    }
                    Decision::Exhausted { attempts } => {
                        assert_eq!(attempts, budget + 1);
                        break;
                    }
                    other => panic!("unexpected decision {:?}", other),
                }
            }
            assert_eq!(opens, budget + 1);
            assert_eq!(rc.attempts(), 0);
        }
    }

    #[test]
    fn test_close_after_open_is_final_even_with_budget() {
        let mut rc = ReconnectController::new(5);
        assert_eq!(rc.observe(AttemptOutcome::Opened), Decision::Proceed);
        assert_eq!(rc.state(), ReconnectState::Connected);
        assert_eq!(
            rc.observe(AttemptOutcome::ClosedAfterOpen),
            Decision::Finished
        );
        assert_eq!(rc.state(), ReconnectState::ClosedFinal);
    }

    #[test]
    fn test_counter_resets_after_success() {
        let mut rc = ReconnectController::new(2);
        assert!(matches!(
            rc.observe(AttemptOutcome::FailedBeforeOpen),
            Decision::Retry { attempt: 1, .. }
        ));
        assert_eq!(rc.attempts(), 1);

        rc.observe(AttemptOutcome::Opened);
        rc.observe(AttemptOutcome::ClosedAfterOpen);
        assert_eq!(rc.attempts(), 0);
    }
}
