//! svpipe Worker - reference pipeline over the result layer

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

mod call;
mod config;
mod coordinator;
mod executor;
mod input;
mod sink;

use config::{Cli, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from(cli);

    info!(
        input = %config.input.display(),
        output = ?config.output,
        workers = config.workers,
        chunk_size = config.chunk_size,
        "Starting svpipe worker"
    );

    let report = coordinator::run(config).await?;

    for failure in &report.failures {
        warn!(error = %failure, "Task failed during run");
    }
    info!(
        run_id = %report.run_id,
        label = %report.label,
        tasks_succeeded = report.tasks_succeeded,
        tasks_failed = report.tasks_failed,
        records_written = report.records_written,
        processed = report.processed_read_count,
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Run finished"
    );

    Ok(())
}
