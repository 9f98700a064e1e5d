use std::time::Duration;

use clap::Parser;

use queuectl::cli::{read_payload, Cli, Command, ConfigAction, DlqAction, WorkerAction};
use queuectl::config::Config;
use queuectl::jobs::{
    enqueue, DlqRepo, JobSpec, JobState, JobsRepo, PoolConfig, RetryPolicy, SettingsRepo,
    WorkerPool,
};
use queuectl::{db, observability, shutdown};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_with_default(if cli.verbose { "debug" } else { "warn" });

    let mut cfg = Config::from_env()?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    let pool = db::connect(&cfg.database_url).await?;
    let jobs = JobsRepo::new(pool.clone());
    let settings = SettingsRepo::new(pool);

    match cli.command {
        Command::Enqueue { payload } => {
            let spec = JobSpec::from_json_bytes(&read_payload(&payload)?)?;
            let current = settings.load().await?;
            let id = enqueue(&jobs, spec, &current).await?;
            println!("enqueued {id}");
        }
        Command::Status => {
            let counts = jobs.aggregate_counts_by_state().await?;
            println!("{counts}");
        }
        Command::List { state } => {
            let state = state.as_deref().map(str::parse::<JobState>).transpose()?;
            for job in jobs.list_jobs(state).await? {
                println!(
                    "{} {} attempts={} max={} {}",
                    job.id,
                    job.state,
                    job.attempts,
                    job.max_retries,
                    job.updated_at.format(queuectl::jobs::model::TIMEFMT)
                );
            }
        }
        Command::Worker {
            action: WorkerAction::Start { count, poll },
        } => {
            let current = settings.load().await?;
            let poll_interval = match poll {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .map_err(|_| anyhow::anyhow!("--poll must be a non-negative number, got {secs}"))?,
                None => cfg.poll_interval,
            };
            let count = count.unwrap_or(cfg.workers);
            if count == 0 {
                anyhow::bail!("--count must be >= 1");
            }

            let workers = WorkerPool::spawn(
                jobs,
                PoolConfig {
                    name: cfg.worker_name,
                    count,
                    poll_interval,
                    job_timeout: cfg.job_timeout,
                    retry: RetryPolicy::from_settings(&current),
                },
            );
            println!("started {count} workers. press Ctrl-C to stop.");

            shutdown::signal().await?;
            workers.shutdown_and_join().await;
            println!("all workers stopped");
        }
        Command::Dlq { action } => {
            let dlq = DlqRepo::new(jobs);
            match action {
                DlqAction::List => {
                    for job in dlq.list().await? {
                        println!(
                            "{} {} last_error={}",
                            job.id,
                            job.command,
                            job.last_error.as_deref().unwrap_or("")
                        );
                    }
                }
                DlqAction::Retry { job_id } => {
                    if dlq.requeue(&job_id).await? {
                        println!("requeued {job_id}");
                    } else {
                        println!("job not found or not in DLQ: {job_id}");
                        std::process::exit(1);
                    }
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Set { key, value } => {
                settings.set(&key, &value).await?;
                println!("ok");
            }
            ConfigAction::Show => {
                let current = settings.load().await?;
                println!(
                    "backoff-base={} default-max-retries={}",
                    current.backoff_base, current.default_max_retries
                );
            }
        },
    }

    Ok(())
}
