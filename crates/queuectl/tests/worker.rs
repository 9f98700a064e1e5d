#![cfg(unix)]

mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::{insert_job, insert_job_at, setup_db};
use queuectl::jobs::model::now_utc;
use queuectl::jobs::{
    Executor, JobOutcome, JobState, JobsRepo, PoolConfig, RetryPolicy, Worker, WorkerPool,
};

fn worker(repo: &JobsRepo) -> Worker {
    Worker::new("worker-0", repo.clone(), RetryPolicy::default(), Executor::default())
}

#[tokio::test]
async fn failing_command_dies_after_exhausting_retries() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    let w = worker(&repo);
    let t0 = now_utc();
    insert_job_at(&repo, "job1", "exit 1", 2, t0).await;

    let mut outcomes = Vec::new();
    for hour in 0..3 {
        let now = t0 + ChronoDuration::hours(hour);
        outcomes.push(w.run_once_at(now).await.unwrap().expect("job should be claimed"));
    }

    assert!(matches!(outcomes[0], JobOutcome::Retrying { attempts: 1, .. }));
    assert!(matches!(outcomes[1], JobOutcome::Retrying { attempts: 2, .. }));
    assert_eq!(outcomes[2], JobOutcome::Dead { attempts: 3 });

    let job = repo.get_job("job1").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 3);

    // Nothing left to do.
    assert!(w
        .run_once_at(t0 + ChronoDuration::hours(10))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn retry_delay_counts_from_when_the_attempt_failed() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    insert_job(&repo, "slowfail", "sleep 2; exit 1", 3).await;

    let before = now_utc();
    let outcome = worker(&repo).run_once().await.unwrap().unwrap();
    let JobOutcome::Retrying { attempts, next_retry_at } = outcome else {
        panic!("expected a scheduled retry, got {outcome:?}");
    };
    assert_eq!(attempts, 1);
    // ran for at least 2s, then a 2s delay
    assert!(next_retry_at >= before + ChronoDuration::seconds(4));

    let job = repo.get_job("slowfail").await.unwrap().unwrap();
    assert_eq!(job.next_retry_at, Some(next_retry_at));
    assert!(job.updated_at >= before + ChronoDuration::seconds(2));

    assert!(repo.claim_at("other", now_utc()).await.unwrap().is_none());
    assert!(repo.claim_at("other", next_retry_at).await.unwrap().is_some());
}

#[tokio::test]
async fn successful_command_stores_its_output() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    insert_job(&repo, "job2", "echo hi", 0).await;

    let outcome = worker(&repo).run_once().await.unwrap();
    assert_eq!(outcome, Some(JobOutcome::Completed));

    let job = repo.get_job("job2").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 0);
    assert!(job.output.unwrap().contains("hi"));
    assert!(job.lock_owner.is_none());
}

#[tokio::test]
async fn stderr_becomes_last_error() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    insert_job(&repo, "noisy", "echo broken >&2; exit 4", 1).await;

    worker(&repo).run_once().await.unwrap();

    let job = repo.get_job("noisy").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::AwaitingRetry);
    assert_eq!(job.last_error.as_deref(), Some("broken"));
}

#[tokio::test]
async fn timed_out_command_counts_as_failure() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    insert_job(&repo, "slow", "sleep 5", 0).await;

    let w = Worker::new(
        "worker-0",
        repo.clone(),
        RetryPolicy::default(),
        Executor::new(Some(Duration::from_millis(200))),
    );
    let outcome = w.run_once().await.unwrap();
    assert_eq!(outcome, Some(JobOutcome::Dead { attempts: 1 }));

    let job = repo.get_job("slow").await.unwrap().unwrap();
    assert!(job.last_error.unwrap().contains("timed out"));
}

async fn wait_for<F>(repo: &JobsRepo, mut done: F)
where
    F: FnMut(&queuectl::jobs::StateCounts) -> bool,
{
    for _ in 0..200 {
        let counts = repo.aggregate_counts_by_state().await.unwrap();
        if done(&counts) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn pool_drains_the_queue() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    for i in 0..5 {
        insert_job(&repo, &format!("job-{i}"), "true", 0).await;
    }

    let pool = WorkerPool::spawn(
        repo.clone(),
        PoolConfig {
            count: 3,
            poll_interval: Duration::from_millis(50),
            ..PoolConfig::default()
        },
    );
    assert_eq!(pool.len(), 3);

    wait_for(&repo, |c| c.completed == 5).await;
    pool.shutdown_and_join().await;

    let jobs = repo.list_jobs(None).await.unwrap();
    assert!(jobs.iter().all(|j| j.state == JobState::Completed));
}

#[tokio::test]
async fn shutdown_lets_the_running_job_finish() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());
    insert_job(&repo, "long", "sleep 1; echo done", 0).await;

    let pool = WorkerPool::spawn(
        repo.clone(),
        PoolConfig {
            count: 1,
            poll_interval: Duration::from_millis(50),
            ..PoolConfig::default()
        },
    );

    wait_for(&repo, |c| c.processing == 1).await;
    pool.shutdown_and_join().await;

    let job = repo.get_job("long").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.output.as_deref(), Some("done"));
}

#[tokio::test]
async fn idle_pool_stops_promptly() {
    let db = setup_db().await;
    let repo = JobsRepo::new(db.pool.clone());

    let pool = WorkerPool::spawn(
        repo.clone(),
        PoolConfig {
            count: 2,
            poll_interval: Duration::from_secs(60),
            ..PoolConfig::default()
        },
    );

    tokio::time::timeout(Duration::from_secs(5), pool.shutdown_and_join())
        .await
        .expect("idle workers should wake up on shutdown");
}
