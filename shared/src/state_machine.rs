//! Command Lifecycle State Machine
//!
//! Status only moves forward: Pending -> Running -> {Completed | Failed}.
//! Nothing leaves a terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Events that drive a command through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Dispatcher picked the command up
    Started,
    /// Execution succeeded
    Succeeded,
    /// Execution failed
    Failed,
}

/// Rejected lifecycle transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition from {from} on {event:?}")]
pub struct TransitionError {
    pub from: CommandStatus,
    pub event: LifecycleEvent,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Running => "running",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    /// Get the next status for a given event, if the transition is valid
    pub fn next(self, event: LifecycleEvent) -> Result<CommandStatus, TransitionError> {
        use CommandStatus::*;

        match (self, event) {
            (Pending, LifecycleEvent::Started) => Ok(Running),
            (Running, LifecycleEvent::Succeeded) => Ok(Completed),
            (Running, LifecycleEvent::Failed) => Ok(Failed),
            (from, event) => Err(TransitionError { from, event }),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a status change is allowed
pub fn is_valid_transition(from: CommandStatus, to: CommandStatus) -> bool {
    use CommandStatus::*;

    matches!(
        (from, to),
        (Pending, Running) | (Running, Completed) | (Running, Failed)
    )
}
