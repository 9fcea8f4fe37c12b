//! Execution status state machine
//!
//! Every ledger row follows `Pending -> Running -> {Completed | Failed}`:
//! - Safety: terminal states never transition again
//! - Liveness: a running execution always reaches a terminal state
//! - Determinism: unique next state per event

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created but not yet started
    Pending,

    /// Provider loop in progress
    Running,

    /// Finished with an output (terminal)
    Completed,

    /// Finished with an error (terminal)
    Failed,
}

/// Events that trigger status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Turn began
    Start,

    /// Provider returned a final answer
    Finish,

    /// Provider, budget, timeout or cancellation failure
    Fail,
}

impl ExecutionStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Attempt a status transition
    ///
    /// Valid transitions:
    /// 1. Pending -> Running   (on: Start)
    /// 2. Pending -> Failed    (on: Fail)
    /// 3. Running -> Completed (on: Finish)
    /// 4. Running -> Failed    (on: Fail)
    ///
    /// Terminal states reject every event: ledger rows never regress.
    pub fn transition(&self, event: StatusEvent) -> Result<ExecutionStatus> {
        use ExecutionStatus::*;
        use StatusEvent::*;

        let next = match (self, event) {
            (Pending, Start) => Running,
            (Pending, Fail) => Failed,
            (Running, Finish) => Completed,
            (Running, Fail) => Failed,
            (from, event) => {
                let reason = if from.is_terminal() {
                    "terminal state".to_string()
                } else {
                    format!("no transition from {} on {:?}", from, event)
                };
                return Err(AgentError::InvalidTransition {
                    from: from.to_string(),
                    to: format!("(via {:?})", event),
                    reason,
                });
            }
        };

        Ok(next)
    }

    /// Get all valid events from this state
    pub fn valid_events(&self) -> Vec<StatusEvent> {
        match self {
            ExecutionStatus::Pending => vec![StatusEvent::Start, StatusEvent::Fail],
            ExecutionStatus::Running => vec![StatusEvent::Finish, StatusEvent::Fail],
            ExecutionStatus::Completed | ExecutionStatus::Failed => vec![],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(AgentError::Validation(format!("unknown execution status '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            ExecutionStatus::Pending.transition(StatusEvent::Start).unwrap(),
            ExecutionStatus::Running
        );
        assert_eq!(
            ExecutionStatus::Pending.transition(StatusEvent::Fail).unwrap(),
            ExecutionStatus::Failed
        );
        assert_eq!(
            ExecutionStatus::Running.transition(StatusEvent::Finish).unwrap(),
            ExecutionStatus::Completed
        );
        assert_eq!(
            ExecutionStatus::Running.transition(StatusEvent::Fail).unwrap(),
            ExecutionStatus::Failed
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(ExecutionStatus::Pending.transition(StatusEvent::Finish).is_err());
        assert!(ExecutionStatus::Running.transition(StatusEvent::Start).is_err());
    }

    #[test]
    fn test_terminal_states_never_regress() {
        for terminal in [ExecutionStatus::Completed, ExecutionStatus::Failed] {
            assert!(terminal.is_terminal());
            assert!(terminal.valid_events().is_empty());
            for event in [StatusEvent::Start, StatusEvent::Finish, StatusEvent::Fail] {
                let err = terminal.transition(event).unwrap_err();
                assert!(err.to_string().contains("terminal state"));
            }
        }
    }

    #[test]
    fn test_valid_events_are_accepted() {
        for status in [ExecutionStatus::Pending, ExecutionStatus::Running] {
            for event in status.valid_events() {
                assert!(status.transition(event).is_ok());
            }
        }
    }

    #[test]
    fn test_string_round_trip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("done".parse::<ExecutionStatus>().is_err());
    }
}
