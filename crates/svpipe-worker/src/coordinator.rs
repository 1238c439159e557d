//! Coordinator: dispatches tasks to the worker pool and consumes outcomes.

use std::sync::Arc;

use svpipe_core::{
    CallWriter, Consumed, EmitConfig, ErrorResult, OutcomeAggregator, ResultError, RunReport,
    TaskOutcome,
};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::call::SvCall;
use crate::config::Config;
use crate::executor::{self, TaskExecutor};
use crate::input::{self, RegionTask};
use crate::sink::TsvCallWriter;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read input '{path}': {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output '{path}': {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Result error: {0}")]
    Result(#[from] ResultError),

    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// Run the whole pipeline described by `config`.
pub async fn run(config: Config) -> Result<RunReport, PipelineError> {
    let tasks = input::read_tasks(&config.input, config.chunk_size).map_err(|source| {
        PipelineError::Input {
            path: config.input.display().to_string(),
            source,
        }
    })?;

    let mut writer = match &config.output {
        Some(path) => Some(TsvCallWriter::create(path).map_err(|source| PipelineError::Output {
            path: path.display().to_string(),
            source,
        })?),
        None => None,
    };

    let emit_config = EmitConfig::new(config.label.clone());
    info!(
        run_id = %emit_config.run_id,
        label = %emit_config.label,
        tasks = tasks.len(),
        workers = config.workers,
        spooled = matches!(config.store, svpipe_core::StoreStrategy::Spooled { .. }),
        "Starting run"
    );

    let report = run_tasks(
        tasks,
        &config,
        &emit_config,
        writer.as_mut().map(|w| w as &mut dyn CallWriter<SvCall>),
    )
    .await?;

    if let (Some(writer), Some(path)) = (writer, &config.output) {
        debug!(path = %path.display(), written = writer.written(), "Closing output");
        writer.finish().map_err(|source| PipelineError::Output {
            path: path.display().to_string(),
            source,
        })?;
    }

    Ok(report)
}

/// Execute `tasks` on the pool and feed every outcome through an aggregator.
///
/// Outcomes are consumed in completion order. Whatever happens, the pool is
/// drained before returning so no handed-off spool file is left behind.
pub async fn run_tasks(
    tasks: Vec<RegionTask>,
    config: &Config,
    emit_config: &EmitConfig,
    writer: Option<&mut dyn CallWriter<SvCall>>,
) -> Result<RunReport, PipelineError> {
    let executor = Arc::new(TaskExecutor::new(config.min_support, config.store.clone()));
    let (tx, mut rx) = mpsc::channel::<String>(config.queue_depth.max(1));
    let dispatcher = tokio::spawn(dispatch(tasks, executor, tx, config.workers.max(1)));

    let mut aggregator = OutcomeAggregator::new(emit_config);
    let consumed =
        consume_messages(&mut rx, &mut aggregator, config.fail_fast, emit_config, writer).await;

    rx.close();
    while let Some(message) = rx.recv().await {
        executor::discard(&message);
    }
    let dispatched = dispatcher
        .await
        .map_err(|e| PipelineError::Pool(e.to_string()))?;

    consumed?;
    dispatched?;

    let report = aggregator.finish();
    info!(
        run_id = %report.run_id,
        label = %report.label,
        succeeded = report.tasks_succeeded,
        failed = report.tasks_failed,
        written = report.records_written,
        "Run complete"
    );
    Ok(report)
}

/// Feed handed-off messages to `aggregator` until the channel closes.
///
/// A message that does not decode counts as a failed task, like any other
/// failure. With `fail_fast` the first failure stops consumption.
async fn consume_messages(
    rx: &mut mpsc::Receiver<String>,
    aggregator: &mut OutcomeAggregator,
    fail_fast: bool,
    emit_config: &EmitConfig,
    mut writer: Option<&mut dyn CallWriter<SvCall>>,
) -> Result<(), PipelineError> {
    while let Some(message) = rx.recv().await {
        let outcome = TaskOutcome::<SvCall>::receive(&message).unwrap_or_else(|e| {
            executor::reject(&message, &e);
            TaskOutcome::Failure(ErrorResult::from(e))
        });
        let sink = writer.as_mut().map(|w| &mut **w as &mut dyn CallWriter<SvCall>);
        if let Consumed::Failed { message } = aggregator.consume(outcome, emit_config, sink)? {
            if fail_fast {
                return Err(PipelineError::TaskFailed(message));
            }
        }
    }
    Ok(())
}

/// Spawn one blocking worker per task, at most `workers` at a time.
async fn dispatch(
    tasks: Vec<RegionTask>,
    executor: Arc<TaskExecutor>,
    tx: mpsc::Sender<String>,
    workers: usize,
) -> Result<(), PipelineError> {
    let limit = Arc::new(Semaphore::new(workers));
    let mut pool = JoinSet::new();

    for task in tasks {
        let permit = limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Pool(e.to_string()))?;
        if tx.is_closed() {
            debug!("Coordinator stopped, not dispatching remaining tasks");
            break;
        }

        let executor = executor.clone();
        let tx = tx.clone();
        pool.spawn_blocking(move || {
            let _permit = permit;
            let message = executor.execute(&task)?;
            if let Err(undelivered) = tx.blocking_send(message) {
                executor::discard(&undelivered.0);
            }
            Ok::<(), ResultError>(())
        });
    }
    drop(tx);

    while let Some(joined) = pool.join_next().await {
        joined.map_err(|e| PipelineError::Pool(e.to_string()))??;
    }
    Ok(())
}
