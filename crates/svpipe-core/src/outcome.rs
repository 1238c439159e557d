//! Task outcomes and their transfer between worker and coordinator.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ErrorResult, ResultError, TaskId, TaskResult};

/// What a worker hands back for exactly one task.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum TaskOutcome<C> {
    Success(TaskResult<C>),
    Failure(ErrorResult),
}

impl<C> TaskOutcome<C> {
    /// Capture the result of running a task, converting any error to a
    /// failure outcome.
    pub fn capture<E: std::error::Error>(result: Result<TaskResult<C>, E>) -> Self {
        match result {
            Ok(result) => Self::Success(result),
            Err(e) => Self::Failure(ErrorResult::from(e)),
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            Self::Success(_) => TaskResult::<C>::ERROR,
            Self::Failure(_) => ErrorResult::ERROR,
        }
    }

    /// Task id of a success. Failures carry none.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Success(result) => Some(result.task_id()),
            Self::Failure(_) => None,
        }
    }

    fn disarm(&mut self) {
        if let Self::Success(result) = self {
            result.disarm();
        }
    }
}

impl<C: Serialize> TaskOutcome<C> {
    /// Serialize this outcome for transfer to the coordinator.
    ///
    /// On success, ownership of any spool file passes to whoever receives
    /// the message; the file is no longer deleted when this value drops. If
    /// serialization fails the outcome drops as usual and its file goes
    /// with it.
    pub fn handoff(mut self) -> Result<String, ResultError> {
        let message = serde_json::to_string(&self)?;
        self.disarm();
        debug!(task_id = ?self.task_id(), bytes = message.len(), "Handed off outcome");
        Ok(message)
    }
}

impl<C: DeserializeOwned> TaskOutcome<C> {
    /// Rebuild an outcome from a handoff message. The receiver owns any
    /// spool file from here on.
    pub fn receive(message: &str) -> Result<Self, ResultError> {
        serde_json::from_str(message)
            .map_err(|e| ResultError::Transfer(format!("invalid outcome message: {e}")))
    }
}
