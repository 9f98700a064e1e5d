//! `queuectl` command line.

use std::path::Path;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about = "Persistent shell-command job queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database URL. Overrides QUEUECTL_DATABASE_URL / DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a job: inline JSON or `@path` to a JSON file.
    Enqueue { payload: String },

    /// Per-state job counts.
    Status,

    /// List jobs oldest first.
    List {
        /// Only jobs in this state (pending, processing, awaiting_retry, completed, dead).
        #[arg(long)]
        state: Option<String>,
    },

    /// Run a worker pool in the foreground until Ctrl+C.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Dead-letter queue.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Runtime queue settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkerAction {
    Start {
        /// Number of workers. Defaults to QUEUECTL_WORKERS.
        #[arg(long)]
        count: Option<usize>,

        /// Idle poll interval in seconds. Defaults to QUEUECTL_POLL_INTERVAL_MS.
        #[arg(long)]
        poll: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum DlqAction {
    List,
    /// Move a dead job back to pending.
    Retry { job_id: String },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Keys: backoff-base, default-max-retries (alias max-retries).
    Set { key: String, value: String },
    Show,
}

/// Payload bytes for `enqueue`: the argument itself, or the contents of the
/// file when it starts with `@`.
pub fn read_payload(arg: &str) -> anyhow::Result<Vec<u8>> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read(Path::new(path))
            .map_err(|e| anyhow::anyhow!("cannot read payload file {path}: {e}")),
        None => Ok(arg.as_bytes().to_vec()),
    }
}
