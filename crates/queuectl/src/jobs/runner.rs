use chrono::{DateTime, Utc};

use crate::jobs::{
    model::ClaimedJob,
    repo::JobsRepo,
    retry::{RetryDecision, RetryPolicy},
};

/// How an attempt was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retrying {
        attempts: u32,
        next_retry_at: DateTime<Utc>,
    },
    Dead {
        attempts: u32,
    },
    /// The worker no longer owned the job; nothing was written.
    Stale,
}

#[derive(Clone)]
pub struct JobRunner {
    jobs: JobsRepo,
    retry: RetryPolicy,
}

impl JobRunner {
    pub fn new(jobs: JobsRepo, retry: RetryPolicy) -> Self {
        Self { jobs, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn on_success(
        &self,
        job: &ClaimedJob,
        worker_id: &str,
        output: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<JobOutcome> {
        if !self
            .jobs
            .mark_completed(&job.id, worker_id, output, now)
            .await?
        {
            tracing::warn!(job_id = %job.id, worker_id, "completion ignored, job no longer owned");
            return Ok(JobOutcome::Stale);
        }

        tracing::info!(job_id = %job.id, worker_id, "job completed");
        Ok(JobOutcome::Completed)
    }

    /// Record a failed attempt that ended at `now`: schedule a retry while
    /// budget remains, otherwise move the job to the DLQ.
    pub async fn on_failure(
        &self,
        job: &ClaimedJob,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<JobOutcome> {
        match self.retry.next_attempt(job.attempts, job.max_retries, now) {
            RetryDecision::Retry {
                attempts,
                delay_secs,
                next_retry_at,
            } => {
                if !self
                    .jobs
                    .mark_retrying(&job.id, worker_id, attempts, error, next_retry_at, now)
                    .await?
                {
                    tracing::warn!(job_id = %job.id, worker_id, "retry ignored, job no longer owned");
                    return Ok(JobOutcome::Stale);
                }

                tracing::info!(
                    job_id = %job.id,
                    worker_id,
                    attempts,
                    max_retries = job.max_retries,
                    delay_secs,
                    "job failed, retry scheduled"
                );
                Ok(JobOutcome::Retrying {
                    attempts,
                    next_retry_at,
                })
            }
            RetryDecision::Dead { attempts } => {
                if !self
                    .jobs
                    .mark_dead(&job.id, worker_id, attempts, error, now)
                    .await?
                {
                    tracing::warn!(job_id = %job.id, worker_id, "dead-letter ignored, job no longer owned");
                    return Ok(JobOutcome::Stale);
                }

                tracing::warn!(
                    job_id = %job.id,
                    worker_id,
                    attempts,
                    last_error = error,
                    "retries exhausted, job moved to DLQ"
                );
                Ok(JobOutcome::Dead { attempts })
            }
        }
    }
}
