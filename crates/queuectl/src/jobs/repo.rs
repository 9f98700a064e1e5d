use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::jobs::model::{format_ts, now_utc, ClaimedJob, Job, JobRow, JobState, NewJob, StateCounts};
use crate::jobs::state::{self, JobEvent};

#[derive(Clone)]
pub struct JobsRepo {
    pool: SqlitePool,
}

impl JobsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    /// Insert a new pending job. Returns `false` when the id is already taken;
    /// the existing row is left as it was.
    pub async fn insert(&self, job: &NewJob, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let ts = format_ts(now);
        let res = sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?4)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(i64::from(job.max_retries))
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, id: &str) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    /// Jobs in `state`, oldest first.
    pub async fn select_by_state(&self, state: JobState) -> anyhow::Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE state = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_jobs(rows)
    }

    /// Every job, or only those in `state`, oldest first.
    pub async fn list_jobs(&self, state: Option<JobState>) -> anyhow::Result<Vec<Job>> {
        match state {
            Some(state) => self.select_by_state(state).await,
            None => {
                let rows = sqlx::query_as::<_, JobRow>(
                    "SELECT * FROM jobs ORDER BY created_at ASC, rowid ASC",
                )
                .fetch_all(&self.pool)
                .await?;
                into_jobs(rows)
            }
        }
    }

    /// Claimable jobs at `now` in claim order.
    pub async fn select_eligible_for_claim(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE state = 'pending'
               OR (state = 'awaiting_retry' AND next_retry_at <= ?1)
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?2
            "#,
        )
        .bind(format_ts(now))
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        into_jobs(rows)
    }

    pub async fn aggregate_counts_by_state(&self) -> anyhow::Result<StateCounts> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT state, COUNT(*) FROM jobs GROUP BY state",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StateCounts::default();
        for (state, n) in rows {
            counts.add(state.parse()?, u64::try_from(n)?);
        }
        Ok(counts)
    }

    // ----------------------------
    // Claiming
    // ----------------------------

    pub async fn claim(&self, worker_id: &str) -> anyhow::Result<Option<ClaimedJob>> {
        self.claim_at(worker_id, now_utc()).await
    }

    /// Take exclusive ownership of the oldest eligible job at `now`.
    ///
    /// The candidate is re-checked inside the UPDATE, so a worker that loses
    /// the race affects zero rows and gets `None`. Losing the write lock to a
    /// concurrent claimer is reported the same way.
    pub async fn claim_at(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ClaimedJob>> {
        match self.try_claim(worker_id, now).await {
            Ok(claimed) => Ok(claimed),
            Err(err) if is_write_contention(&err) => {
                tracing::debug!(worker_id, error = %err, "claim lost to a concurrent writer");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn try_claim(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedJob>, sqlx::Error> {
        let ts = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE state = 'pending'
               OR (state = 'awaiting_retry' AND next_retry_at <= ?1)
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
            "#,
        )
        .bind(&ts)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = candidate else {
            tx.rollback().await?;
            return Ok(None);
        };

        let job = Job::try_from(row).map_err(|e| sqlx::Error::Decode(e.into()))?;
        if !state::is_eligible(job.state, job.next_retry_at, now)
            || state::next_state(job.state, JobEvent::Claim).is_err()
        {
            tx.rollback().await?;
            return Ok(None);
        }

        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing',
                lock_owner = ?2,
                next_retry_at = NULL,
                updated_at = ?3
            WHERE id = ?1
              AND (state = 'pending' OR (state = 'awaiting_retry' AND next_retry_at <= ?3))
            "#,
        )
        .bind(&job.id)
        .bind(worker_id)
        .bind(&ts)
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!(worker_id, job_id = %job.id, "claim lost race");
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(ClaimedJob::from(job)))
    }

    // ----------------------------
    // State transitions
    // ----------------------------
    //
    // Each update only applies while `worker_id` still owns the job in
    // Processing. `false` means the caller no longer owns it.

    pub async fn mark_completed(
        &self,
        id: &str,
        worker_id: &str,
        output: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                lock_owner = NULL,
                output = ?3,
                updated_at = ?4
            WHERE id = ?1
              AND state = 'processing'
              AND lock_owner = ?2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(output)
        .bind(format_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn mark_retrying(
        &self,
        id: &str,
        worker_id: &str,
        attempts: u32,
        last_error: &str,
        next_retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'awaiting_retry',
                lock_owner = NULL,
                attempts = ?3,
                last_error = ?4,
                next_retry_at = ?5,
                updated_at = ?6
            WHERE id = ?1
              AND state = 'processing'
              AND lock_owner = ?2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(i64::from(attempts))
        .bind(last_error)
        .bind(format_ts(next_retry_at))
        .bind(format_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn mark_dead(
        &self,
        id: &str,
        worker_id: &str,
        attempts: u32,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'dead',
                lock_owner = NULL,
                attempts = ?3,
                last_error = ?4,
                updated_at = ?5
            WHERE id = ?1
              AND state = 'processing'
              AND lock_owner = ?2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(i64::from(attempts))
        .bind(last_error)
        .bind(format_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }
}

fn into_jobs(rows: Vec<JobRow>) -> anyhow::Result<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

/// SQLITE_BUSY or SQLITE_LOCKED, including extended codes such as
/// SQLITE_BUSY_SNAPSHOT.
fn is_write_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}
