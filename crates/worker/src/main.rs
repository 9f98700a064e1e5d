use queuectl::api;
use queuectl::config;
use queuectl::db;
use queuectl::jobs::{JobsRepo, PoolConfig, RetryPolicy, SettingsRepo, WorkerPool};
use queuectl::observability;
use queuectl::shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cfg = config::Config::from_env()?;

    tracing::info!(
        database_url = %cfg.database_url,
        worker_name = %cfg.worker_name,
        workers = cfg.workers,
        poll_interval = ?cfg.poll_interval,
        job_timeout_secs = cfg.job_timeout.map(|d| d.as_secs()),
        admin_addr = cfg.admin_addr.as_deref().unwrap_or("disabled"),
        "queuectl worker starting"
    );

    let pool = db::connect(&cfg.database_url).await?;
    let jobs_repo = JobsRepo::new(pool.clone());
    let settings_repo = SettingsRepo::new(pool);

    // Settings are read once; restart the service to pick up a new backoff base.
    let settings = settings_repo.load().await?;
    tracing::info!(
        backoff_base = settings.backoff_base,
        default_max_retries = settings.default_max_retries,
        "queue settings loaded"
    );

    // ---- API task ----
    let api_handle = match cfg.admin_addr.clone() {
        Some(addr) => {
            let app = api::router(api::ApiState::new(jobs_repo.clone(), settings_repo.clone()));
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("admin api listening on http://{addr}");
            Some(tokio::spawn(async move { axum::serve(listener, app).await }))
        }
        None => None,
    };

    // ---- Worker pool ----
    let workers = WorkerPool::spawn(
        jobs_repo,
        PoolConfig {
            name: cfg.worker_name.clone(),
            count: cfg.workers,
            poll_interval: cfg.poll_interval,
            job_timeout: cfg.job_timeout,
            retry: RetryPolicy::from_settings(&settings),
        },
    );

    shutdown::signal().await?;
    workers.shutdown_and_join().await;

    if let Some(handle) = api_handle {
        handle.abort();
    }

    tracing::info!("queuectl worker stopped");
    Ok(())
}
