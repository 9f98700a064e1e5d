use serde::Deserialize;
use uuid::Uuid;

use crate::error::EnqueueError;
use crate::jobs::{
    model::{now_utc, NewJob},
    repo::JobsRepo,
    settings::QueueSettings,
};

/// Producer-supplied job description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EnqueueError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Validate and fill in defaults. A missing id gets a random hex id; a
    /// missing `max_retries` gets the configured default, an explicit 0 is
    /// kept.
    pub fn into_new_job(self, settings: &QueueSettings) -> Result<NewJob, EnqueueError> {
        let command = match self.command {
            Some(c) if !c.trim().is_empty() => c,
            _ => return Err(EnqueueError::MissingCommand),
        };

        let id = match self.id {
            Some(id) if id.trim().is_empty() => return Err(EnqueueError::BlankId),
            Some(id) => id,
            None => Uuid::new_v4().simple().to_string(),
        };

        Ok(NewJob {
            id,
            command,
            max_retries: self.max_retries.unwrap_or(settings.default_max_retries),
        })
    }
}

/// Validate `spec` and insert it as a pending job. Returns the assigned id.
pub async fn enqueue(
    jobs: &JobsRepo,
    spec: JobSpec,
    settings: &QueueSettings,
) -> Result<String, EnqueueError> {
    let job = spec.into_new_job(settings)?;

    if !jobs.insert(&job, now_utc()).await? {
        return Err(EnqueueError::DuplicateId(job.id));
    }

    tracing::info!(job_id = %job.id, max_retries = job.max_retries, "job enqueued");
    Ok(job.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_payload_and_applies_defaults() {
        let spec = JobSpec::from_json_bytes(br#"{"command":"echo hi"}"#).unwrap();
        let job = spec.into_new_job(&QueueSettings::default()).unwrap();

        assert_eq!(job.command, "echo hi");
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.id.len(), 32);
        assert!(job.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn explicit_zero_retries_is_kept() {
        let settings = QueueSettings {
            default_max_retries: 7,
            ..QueueSettings::default()
        };
        let spec = JobSpec::from_json_bytes(br#"{"id":"a","command":"true","max_retries":0}"#).unwrap();
        let job = spec.into_new_job(&settings).unwrap();
        assert_eq!(job.id, "a");
        assert_eq!(job.max_retries, 0);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            JobSpec::from_json_bytes(b"{not json"),
            Err(EnqueueError::InvalidJson(_))
        ));
        assert!(matches!(
            JobSpec::from_json_bytes(br#"{"command":"x","max_retries":-1}"#),
            Err(EnqueueError::InvalidJson(_))
        ));

        let settings = QueueSettings::default();
        let no_command = JobSpec::from_json_bytes(br#"{"id":"x"}"#).unwrap();
        assert!(matches!(
            no_command.into_new_job(&settings),
            Err(EnqueueError::MissingCommand)
        ));

        let blank_command = JobSpec::new("   ");
        assert!(matches!(
            blank_command.into_new_job(&settings),
            Err(EnqueueError::MissingCommand)
        ));

        let blank_id = JobSpec {
            id: Some(" ".to_string()),
            ..JobSpec::new("true")
        };
        assert!(matches!(blank_id.into_new_job(&settings), Err(EnqueueError::BlankId)));
    }
}
