pub mod dlq;
pub mod enqueue;
pub mod executor;
pub mod model;
pub mod repo;
pub mod retry;
pub mod runner;
pub mod settings;
pub mod state;
pub mod worker;

pub use dlq::DlqRepo;
pub use enqueue::{enqueue, JobSpec};
pub use executor::{ExecOutcome, Executor};
pub use model::{ClaimedJob, Job, JobState, NewJob, StateCounts};
pub use repo::JobsRepo;
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{JobOutcome, JobRunner};
pub use settings::{QueueSettings, SettingKey, SettingsRepo};
pub use worker::{PoolConfig, Worker, WorkerPool};
