use crate::jobs::{
    model::{format_ts, now_utc, Job, JobState},
    repo::JobsRepo,
};

/// Dead-letter queue view over the jobs table.
#[derive(Clone)]
pub struct DlqRepo {
    jobs: JobsRepo,
}

impl DlqRepo {
    pub fn new(jobs: JobsRepo) -> Self {
        Self { jobs }
    }

    /// Dead jobs, oldest first.
    pub async fn list(&self) -> anyhow::Result<Vec<Job>> {
        self.jobs.select_by_state(JobState::Dead).await
    }

    /// Move a dead job back to Pending with a fresh retry budget.
    ///
    /// `last_error` is kept. Returns `false` if the job does not exist or is
    /// not dead.
    pub async fn requeue(&self, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempts = 0,
                lock_owner = NULL,
                next_retry_at = NULL,
                updated_at = ?2
            WHERE id = ?1
              AND state = 'dead'
            "#,
        )
        .bind(id)
        .bind(format_ts(now_utc()))
        .execute(self.jobs.pool())
        .await?;

        let requeued = res.rows_affected() == 1;
        if requeued {
            tracing::info!(job_id = id, "requeued from DLQ");
        } else {
            tracing::debug!(job_id = id, "requeue skipped, job missing or not dead");
        }
        Ok(requeued)
    }
}
