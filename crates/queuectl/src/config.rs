use std::time::Duration;

// Process-level configuration, loaded from the environment (and `.env`).
// Queue behaviour knobs (backoff base, default retries) live in the settings
// table instead, see `jobs::settings`.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_name: String,
    pub workers: usize,
    pub poll_interval: Duration,
    pub job_timeout: Option<Duration>,
    pub admin_addr: Option<String>,
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://queue.db";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("QUEUECTL_DATABASE_URL", "DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let worker_name = env_or_fallback("QUEUECTL_WORKER_NAME", "WORKER_NAME")
            .unwrap_or_else(|| "worker".to_string());

        let workers = match env_or_fallback("QUEUECTL_WORKERS", "WORKERS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| anyhow::anyhow!("QUEUECTL_WORKERS must be >= 1, got {raw:?}"))?,
            None => 1,
        };

        let poll_interval_ms = match env_or_fallback("QUEUECTL_POLL_INTERVAL_MS", "POLL_INTERVAL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("QUEUECTL_POLL_INTERVAL_MS is not a number: {raw:?}"))?,
            None => 2_000,
        };

        let job_timeout = match std::env::var("QUEUECTL_JOB_TIMEOUT_SECS")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    anyhow::anyhow!("QUEUECTL_JOB_TIMEOUT_SECS is not a number: {raw:?}")
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let admin_addr = env_or_fallback("QUEUECTL_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        Ok(Self {
            database_url,
            worker_name,
            workers,
            poll_interval: Duration::from_millis(poll_interval_ms),
            job_timeout,
            admin_addr,
        })
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
