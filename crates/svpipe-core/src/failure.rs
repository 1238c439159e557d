//! Failed task results.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The outcome of a task that failed.
///
/// Deliberately shares nothing with [`TaskResult`](crate::TaskResult): no
/// task id, no calls, no emit. It only carries the failure message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    message: String,
}

impl ErrorResult {
    /// Failure results are always errors.
    pub const ERROR: bool = true;

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build from a panic payload caught around task execution.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new(format!("task panicked: {detail}"))
    }

    pub fn error(&self) -> bool {
        Self::ERROR
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ErrorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<E> for ErrorResult {
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}
