use chrono::{DateTime, Utc};
use queuectl::jobs::model::now_utc;
use queuectl::jobs::{JobsRepo, NewJob};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub struct TestDb {
    pub pool: SqlitePool,
    // Keeps the database file alive for the duration of the test.
    _dir: TempDir,
}

/// Fresh, migrated database in its own temp directory.
pub async fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());

    let pool = queuectl::db::connect(&url)
        .await
        .expect("failed to open test database");

    TestDb { pool, _dir: dir }
}

#[allow(dead_code)]
pub async fn insert_job_at(
    repo: &JobsRepo,
    id: &str,
    command: &str,
    max_retries: u32,
    created_at: DateTime<Utc>,
) {
    let inserted = repo
        .insert(
            &NewJob {
                id: id.to_string(),
                command: command.to_string(),
                max_retries,
            },
            created_at,
        )
        .await
        .expect("failed to insert job");
    assert!(inserted, "job {id} already existed");
}

#[allow(dead_code)]
pub async fn insert_job(repo: &JobsRepo, id: &str, command: &str, max_retries: u32) {
    insert_job_at(repo, id, command, max_retries, now_utc()).await;
}
