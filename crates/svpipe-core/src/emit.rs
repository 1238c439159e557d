//! Emission contract: the output side a result writes its calls to.

use std::fmt;

use crate::{ResultError, RunId};

/// A sink that accepts one call at a time, in order.
///
/// `Display` should describe the sink (usually its path) for log lines.
pub trait CallWriter<C>: fmt::Display {
    fn write_call(&mut self, call: &C) -> Result<(), ResultError>;
}

/// Run-level settings passed into every emit.
#[derive(Debug, Clone)]
pub struct EmitConfig {
    /// Run the emission belongs to, used for log correlation.
    pub run_id: RunId,
    /// Human-readable run label.
    pub label: String,
}

impl EmitConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            run_id: RunId::generate(),
            label: label.into(),
        }
    }

    /// Builder method to pin the run id.
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self::new("svpipe")
    }
}
