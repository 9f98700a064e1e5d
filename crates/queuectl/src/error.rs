use thiserror::Error;

use crate::jobs::model::JobState;
use crate::jobs::state::JobEvent;

/// Rejected producer payloads. Nothing is written to the store when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("invalid job payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("job payload is missing required field `command`")]
    MissingCommand,

    #[error("job id must not be blank")]
    BlankId,

    #[error("job with id {0} already exists")]
    DuplicateId(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown config key {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} from {from}")]
pub struct TransitionError {
    pub from: JobState,
    pub event: JobEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job state {0:?}")]
pub struct ParseStateError(pub String);
