//! Pipeline configuration.

use std::path::PathBuf;

use clap::Parser;
use svpipe_core::StoreStrategy;
use tracing::Level;

/// svpipe worker - run a combine pass over SV calls on a worker pool
#[derive(Parser, Debug)]
#[command(name = "svpipe-worker")]
#[command(about = "Combine SV calls on a pool of workers", long_about = None)]
pub struct Cli {
    /// Input calls, one JSON record per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output TSV; omit for a statistics-only run
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of workers (0 = available parallelism)
    #[arg(short = 't', long, default_value_t = 0)]
    pub threads: usize,

    /// Calls per task
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    /// Spool task payloads to this directory instead of keeping them in memory
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,

    /// Drop calls with fewer supporting reads
    #[arg(long, default_value_t = 0)]
    pub min_support: u32,

    /// Abort the run on the first failed task
    #[arg(long)]
    pub fail_fast: bool,

    /// Run label used in log lines
    #[arg(long, default_value = "svpipe")]
    pub label: String,

    /// Maximum log level
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-lines call file.
    pub input: PathBuf,

    /// TSV output path. `None` runs without output.
    pub output: Option<PathBuf>,

    /// Number of concurrent workers.
    pub workers: usize,

    /// Calls per task.
    pub chunk_size: usize,

    /// How task results hold their calls.
    pub store: StoreStrategy,

    /// Minimum supporting reads for a call to be kept.
    pub min_support: u32,

    /// Treat any task failure as fatal.
    pub fail_fast: bool,

    /// Outcomes buffered between workers and the coordinator.
    pub queue_depth: usize,

    /// Run label.
    pub label: String,
}

impl Default for Config {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            input: PathBuf::from("calls.jsonl"),
            output: None,
            workers,
            chunk_size: 1000,
            store: StoreStrategy::InMemory,
            min_support: 0,
            fail_fast: false,
            queue_depth: workers * 2,
            label: "svpipe".to_string(),
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let workers = if cli.threads == 0 { default_workers() } else { cli.threads };
        let store = match cli.spool_dir {
            Some(dir) => StoreStrategy::spooled(dir),
            None => StoreStrategy::InMemory,
        };
        Self {
            input: cli.input,
            output: cli.output,
            workers,
            chunk_size: cli.chunk_size.max(1),
            store,
            min_support: cli.min_support,
            fail_fast: cli.fail_fast,
            queue_depth: workers * 2,
            label: cli.label,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
