use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseStateError;

/// Storage format for every timestamp column. Fixed width, so text order is
/// chronological order.
pub const TIMEFMT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMEFMT).to_string()
}

pub fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMEFMT)
        .map_err(|e| anyhow::anyhow!("bad timestamp {s:?}: {e}"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    AwaitingRetry,
    Completed,
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::AwaitingRetry,
        JobState::Completed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::AwaitingRetry => "awaiting_retry",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "awaiting_retry" | "retrying" => Ok(JobState::AwaitingRetry),
            "completed" => Ok(JobState::Completed),
            "dead" => Ok(JobState::Dead),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lock_owner: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub output: Option<String>,
}

/// Raw `jobs` row; timestamps and state are kept as text until validated.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: String,
    pub command: String,
    pub state: String,
    pub attempts: i64,
    pub max_retries: i64,
    pub created_at: String,
    pub updated_at: String,
    pub lock_owner: Option<String>,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
    pub output: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            state: row.state.parse()?,
            attempts: u32::try_from(row.attempts)?,
            max_retries: u32::try_from(row.max_retries)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            next_retry_at: row.next_retry_at.as_deref().map(parse_ts).transpose()?,
            id: row.id,
            command: row.command,
            lock_owner: row.lock_owner,
            last_error: row.last_error,
            output: row.output,
        })
    }
}

/// A validated job ready for insertion.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub command: String,
    pub max_retries: u32,
}

/// What a worker gets back from a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: String,
    pub command: String,
    pub attempts: u32,
    pub max_retries: u32,
}

impl From<Job> for ClaimedJob {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            command: job.command,
            attempts: job.attempts,
            max_retries: job.max_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: u64,
    pub processing: u64,
    pub awaiting_retry: u64,
    pub completed: u64,
    pub dead: u64,
}

impl StateCounts {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::AwaitingRetry => self.awaiting_retry,
            JobState::Completed => self.completed,
            JobState::Dead => self.dead,
        }
    }

    pub(crate) fn add(&mut self, state: JobState, n: u64) {
        match state {
            JobState::Pending => self.pending += n,
            JobState::Processing => self.processing += n,
            JobState::AwaitingRetry => self.awaiting_retry += n,
            JobState::Completed => self.completed += n,
            JobState::Dead => self.dead += n,
        }
    }

    pub fn total(&self) -> u64 {
        JobState::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

impl fmt::Display for StateCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending={} processing={} awaiting_retry={} completed={} dead={}",
            self.pending, self.processing, self.awaiting_retry, self.completed, self.dead
        )
    }
}
