use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::jobs::{
    executor::Executor,
    model::now_utc,
    repo::JobsRepo,
    retry::RetryPolicy,
    runner::{JobOutcome, JobRunner},
};

/// One claim/execute/record loop participant.
#[derive(Clone)]
pub struct Worker {
    id: String,
    jobs: JobsRepo,
    runner: JobRunner,
    executor: Executor,
}

impl Worker {
    pub fn new(id: impl Into<String>, jobs: JobsRepo, retry: RetryPolicy, executor: Executor) -> Self {
        let runner = JobRunner::new(jobs.clone(), retry);
        Self {
            id: id.into(),
            jobs,
            runner,
            executor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claim and run at most one job. `None` when nothing was eligible.
    pub async fn run_once(&self) -> anyhow::Result<Option<JobOutcome>> {
        self.run_once_at(now_utc()).await
    }

    /// Same as [`Worker::run_once`] with an explicit claim time.
    ///
    /// The outcome is recorded at `now` plus the time the command took, so a
    /// retry delay always counts from the moment the attempt failed.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> anyhow::Result<Option<JobOutcome>> {
        let Some(job) = self.jobs.claim_at(&self.id, now).await? else {
            return Ok(None);
        };

        tracing::info!(
            worker_id = %self.id,
            job_id = %job.id,
            command = %job.command,
            attempts = job.attempts,
            max_retries = job.max_retries,
            "picked job"
        );

        let started = Instant::now();
        let out = self.executor.run(&job.command).await;
        let finished_at = (now + elapsed_since(started)).trunc_subsecs(0);

        let outcome = if out.succeeded() {
            self.runner
                .on_success(&job, &self.id, &out.combined_output(), finished_at)
                .await?
        } else {
            self.runner
                .on_failure(&job, &self.id, &out.error_text(), finished_at)
                .await?
        };
        Ok(Some(outcome))
    }
}

fn elapsed_since(started: Instant) -> ChronoDuration {
    ChronoDuration::from_std(started.elapsed()).unwrap_or_else(|_| ChronoDuration::zero())
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers are named `{name}-{index}`.
    pub name: String,
    pub count: usize,
    pub poll_interval: Duration,
    pub job_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            count: 1,
            poll_interval: Duration::from_secs(2),
            job_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle to a running set of workers.
///
/// Shutdown stops new claims; a job already executing runs to completion and
/// its outcome is recorded before the worker exits.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(jobs: JobsRepo, cfg: PoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let executor = Executor::new(cfg.job_timeout);

        let mut joins = Vec::with_capacity(cfg.count);
        for i in 0..cfg.count {
            let worker = Worker::new(
                format!("{}-{i}", cfg.name),
                jobs.clone(),
                cfg.retry,
                executor.clone(),
            );
            let mut rx = shutdown_rx.clone();
            let poll_interval = cfg.poll_interval;

            joins.push(tokio::spawn(async move {
                worker_loop(worker, poll_interval, &mut rx).await;
            }));
        }

        tracing::info!(
            workers = cfg.count,
            poll_interval = ?cfg.poll_interval,
            "worker pool started"
        );
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait for every worker to finish its current job.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
        tracing::info!("all workers stopped");
    }
}

async fn worker_loop(worker: Worker, poll_interval: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let idle = match worker.run_once().await {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                tracing::error!(worker_id = %worker.id(), error = %e, "worker cycle failed");
                true
            }
        };

        if idle {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
    tracing::info!(worker_id = %worker.id(), "worker stopped");
}
