//! Task execution on a worker.
//!
//! A worker turns one [`RegionTask`] into exactly one handed-off outcome.
//! Errors and panics inside the task become failure outcomes; they never
//! escape the worker.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use svpipe_core::{ErrorResult, ResultError, ResultKind, StoreStrategy, TaskOutcome, TaskResult};
use thiserror::Error;
use tracing::{debug, warn};

use crate::call::SvCall;
use crate::input::RegionTask;

/// Errors that fail a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("line {line}: invalid call record: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: {reason}")]
    InvalidCall { line: usize, reason: String },

    #[error("Failed to store result: {0}")]
    Store(#[from] ResultError),
}

/// Runs tasks and hands off their outcomes.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    min_support: u32,
    store: StoreStrategy,
}

impl TaskExecutor {
    pub fn new(min_support: u32, store: StoreStrategy) -> Self {
        Self { min_support, store }
    }

    /// Parse, validate and filter the task's calls into a combine result.
    pub fn run(&self, task: &RegionTask) -> Result<TaskResult<SvCall>, TaskError> {
        debug!(
            task_id = %task.id,
            first_line = task.first_line,
            lines = task.lines.len(),
            "Running task"
        );

        let mut calls = Vec::with_capacity(task.lines.len());
        for (line, raw) in &task.lines {
            let call: SvCall = serde_json::from_str(raw)
                .map_err(|source| TaskError::Parse { line: *line, source })?;
            call.validate()
                .map_err(|reason| TaskError::InvalidCall { line: *line, reason })?;
            if call.support >= self.min_support {
                calls.push(call);
            }
        }

        let processed = task.lines.len() as u64;
        Ok(TaskResult::new(task, ResultKind::Combine, calls, processed, &self.store)?)
    }

    /// Run `task` and serialize its outcome for the coordinator.
    pub fn execute(&self, task: &RegionTask) -> Result<String, ResultError> {
        let outcome = guard_task(|| self.run(task));
        if let TaskOutcome::Failure(failure) = &outcome {
            warn!(task_id = %task.id, error = %failure, "Task failed");
        }

        outcome.handoff().or_else(|e| {
            warn!(task_id = %task.id, error = %e, "Failed to hand off outcome");
            TaskOutcome::<SvCall>::Failure(ErrorResult::new(format!(
                "task {}: failed to hand off outcome: {e}",
                task.id
            )))
            .handoff()
        })
    }
}

/// Run `f`, turning an error or a panic into a failure outcome.
pub fn guard_task<F>(f: F) -> TaskOutcome<SvCall>
where
    F: FnOnce() -> Result<TaskResult<SvCall>, TaskError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => TaskOutcome::capture(result),
        Err(payload) => TaskOutcome::Failure(ErrorResult::from_panic(payload)),
    }
}

/// Take back a message the coordinator will never receive, so its spool
/// file is removed.
pub fn discard(message: &str) {
    match TaskOutcome::<SvCall>::receive(message) {
        Ok(outcome) => debug!(task_id = ?outcome.task_id(), "Discarded undelivered outcome"),
        Err(e) => reject(message, &e),
    }
}

/// Spool file named by a handed-off message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StraySpool {
    pub task_id: Option<u64>,
    pub path: PathBuf,
}

/// Find the spool file a message points at without decoding its calls.
///
/// Returns `None` for in-memory results, released files and messages that
/// are not JSON at all.
pub fn stray_spool(message: &str) -> Option<StraySpool> {
    let value: serde_json::Value = serde_json::from_str(message).ok()?;
    let data = value.pointer("/result/payload/data")?;
    if data.get("released").and_then(serde_json::Value::as_bool) == Some(true) {
        return None;
    }
    let path = PathBuf::from(data.get("path")?.as_str()?);
    let is_spool_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("tmp") && name.ends_with(".part"));
    if !is_spool_name {
        return None;
    }

    Some(StraySpool {
        task_id: value.pointer("/result/task_id").and_then(serde_json::Value::as_u64),
        path,
    })
}

/// Log a message that failed to decode and remove the spool file it names.
pub fn reject(message: &str, error: &ResultError) {
    let preview: String = message.chars().take(MESSAGE_PREVIEW).collect();
    let Some(stray) = stray_spool(message) else {
        warn!(error = %error, message = %preview, "Failed to decode outcome message");
        return;
    };

    warn!(
        task_id = ?stray.task_id,
        path = %stray.path.display(),
        error = %error,
        message = %preview,
        "Failed to decode outcome message, removing its spool file"
    );
    if let Err(e) = fs::remove_file(&stray.path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %stray.path.display(), error = %e, "Failed to remove stray spool file");
        }
    }
}

const MESSAGE_PREVIEW: usize = 200;
