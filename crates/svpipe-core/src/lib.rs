//! svpipe Core Result Layer
//!
//! This crate contains the outcome types a worker hands back to the
//! coordinator after running one task:
//! - Success results with a pluggable payload store (memory or spool file)
//! - A separate failure result carrying only a message
//! - The serialized handoff used to move outcomes between processes
//!
//! Nothing here schedules tasks, calls variants, or formats output files.

pub mod aggregate;
pub mod emit;
pub mod error;
pub mod failure;
pub mod ids;
pub mod outcome;
pub mod result;
pub mod store;
pub mod task;

// Re-export commonly used types
pub use aggregate::{Consumed, OutcomeAggregator, RunReport};
pub use emit::{CallWriter, EmitConfig};
pub use error::ResultError;
pub use failure::ErrorResult;
pub use ids::{RunId, TaskId};
pub use outcome::TaskOutcome;
pub use result::{CallSummary, ResultKind, SnfPart, TaskResult};
pub use store::{
    spool_path, CallRecord, InMemoryStore, Payload, PayloadStore, SpoolGuard, SpooledStore,
    StoreStrategy,
};
pub use task::WorkUnit;
