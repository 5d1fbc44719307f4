//! Per-intent execution state machine.
//!
//! From the executor's viewpoint an intent moves through
//! `Pending → InFlight → (Passed | Failing) → (InFlight | HumanReview)`;
//! `Passed` and `HumanReview` are terminal. Invalid transitions are
//! structured errors rather than panics so executor bugs surface loudly in
//! tests.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// IntentState / IntentEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Pending,
    InFlight,
    Passed,
    Failing,
    HumanReview,
}

impl IntentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IntentState::Passed | IntentState::HumanReview)
    }
}

impl fmt::Display for IntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntentState::Pending => "pending",
            IntentState::InFlight => "in_flight",
            IntentState::Passed => "passed",
            IntentState::Failing => "failing",
            IntentState::HumanReview => "human_review",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentEvent {
    /// A dispatch (first attempt or retry) went out.
    Dispatch,
    /// Gate 1 passed.
    Pass,
    /// Gate 1 failed or the backend errored.
    Fail,
    /// The retry budget ran out or the recommender flagged the intent.
    Flag,
}

impl fmt::Display for IntentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntentEvent::Dispatch => "dispatch",
            IntentEvent::Pass => "pass",
            IntentEvent::Fail => "fail",
            IntentEvent::Flag => "flag",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid transition: cannot apply {event} in state {state}")]
    InvalidTransition {
        state: IntentState,
        event: IntentEvent,
    },
}

// ---------------------------------------------------------------------------
// IntentStateMachine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IntentStateMachine {
    current: IntentState,
    history: Vec<(IntentState, IntentEvent, IntentState)>,
}

impl IntentStateMachine {
    /// Start in `Pending`.
    pub fn new() -> Self {
        Self {
            current: IntentState::Pending,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> IntentState {
        self.current
    }

    pub fn history(&self) -> &[(IntentState, IntentEvent, IntentState)] {
        &self.history
    }

    /// Attempt a transition driven by `event`.
    ///
    /// Valid transitions:
    /// - Pending  + Dispatch -> InFlight
    /// - InFlight + Pass     -> Passed
    /// - InFlight + Fail     -> Failing
    /// - Failing  + Dispatch -> InFlight
    /// - Failing  + Flag     -> HumanReview
    pub fn transition(&mut self, event: IntentEvent) -> Result<IntentState, StateError> {
        let next = match (self.current, event) {
            (IntentState::Pending, IntentEvent::Dispatch) => IntentState::InFlight,
            (IntentState::InFlight, IntentEvent::Pass) => IntentState::Passed,
            (IntentState::InFlight, IntentEvent::Fail) => IntentState::Failing,
            (IntentState::Failing, IntentEvent::Dispatch) => IntentState::InFlight,
            (IntentState::Failing, IntentEvent::Flag) => IntentState::HumanReview,
            _ => {
                return Err(StateError::InvalidTransition {
                    state: self.current,
                    event,
                });
            }
        };
        let from = self.current;
        self.current = next;
        self.history.push((from, event, next));
        tracing::debug!(from = %from, event = %event, to = %next, "intent state transition");
        Ok(next)
    }
}

impl Default for IntentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_to_passed() {
        let mut sm = IntentStateMachine::new();
        sm.transition(IntentEvent::Dispatch).unwrap();
        sm.transition(IntentEvent::Pass).unwrap();
        assert_eq!(sm.state(), IntentState::Passed);
        assert!(sm.state().is_terminal());
        assert_eq!(sm.history().len(), 2);
    }

    #[test]
    fn retry_loop_then_human_review() {
        let mut sm = IntentStateMachine::new();
        sm.transition(IntentEvent::Dispatch).unwrap();
        sm.transition(IntentEvent::Fail).unwrap();
        sm.transition(IntentEvent::Dispatch).unwrap();
        sm.transition(IntentEvent::Fail).unwrap();
        sm.transition(IntentEvent::Flag).unwrap();
        assert_eq!(sm.state(), IntentState::HumanReview);
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn terminal_states_reject_everything() {
        let mut sm = IntentStateMachine::new();
        sm.transition(IntentEvent::Dispatch).unwrap();
        sm.transition(IntentEvent::Pass).unwrap();
        for event in [
            IntentEvent::Dispatch,
            IntentEvent::Pass,
            IntentEvent::Fail,
            IntentEvent::Flag,
        ] {
            assert!(sm.transition(event).is_err());
        }
    }

    #[test]
    fn pending_only_accepts_dispatch() {
        let mut sm = IntentStateMachine::new();
        let err = sm.transition(IntentEvent::Pass).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                state: IntentState::Pending,
                event: IntentEvent::Pass,
            }
        );
    }
}
