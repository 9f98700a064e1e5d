//! Job state machine. Pure: no I/O, no clock.
//!
//! ```text
//! Pending ──claim──► Processing ──succeed──► Completed
//!    ▲                 │    ▲
//!    │                 │    └──claim (next_retry_at <= now)──┐
//!    │                 ├──retry──► AwaitingRetry ────────────┘
//!    │                 └──exhaust──► Dead
//!    └────────────requeue─────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::TransitionError;
use crate::jobs::model::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// A worker took exclusive ownership.
    Claim,
    /// The command exited successfully.
    Succeed,
    /// The command failed and retry budget remains.
    Retry,
    /// The command failed and the retry budget is spent.
    Exhaust,
    /// Manual DLQ requeue.
    Requeue,
}

pub fn next_state(from: JobState, event: JobEvent) -> Result<JobState, TransitionError> {
    use JobEvent::*;
    use JobState::*;

    match (from, event) {
        (Pending | AwaitingRetry, Claim) => Ok(Processing),
        (Processing, Succeed) => Ok(Completed),
        (Processing, Retry) => Ok(AwaitingRetry),
        (Processing, Exhaust) => Ok(Dead),
        (Dead, Requeue) => Ok(Pending),
        _ => Err(TransitionError { from, event }),
    }
}

impl JobState {
    /// Completed and Dead. Dead only leaves through a manual requeue.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

/// Whether a job in `state` may be claimed at `now`.
pub fn is_eligible(state: JobState, next_retry_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match state {
        JobState::Pending => true,
        JobState::AwaitingRetry => next_retry_at.is_some_and(|at| at <= now),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn valid_edges() {
        assert_eq!(next_state(JobState::Pending, JobEvent::Claim), Ok(JobState::Processing));
        assert_eq!(
            next_state(JobState::AwaitingRetry, JobEvent::Claim),
            Ok(JobState::Processing)
        );
        assert_eq!(next_state(JobState::Processing, JobEvent::Succeed), Ok(JobState::Completed));
        assert_eq!(
            next_state(JobState::Processing, JobEvent::Retry),
            Ok(JobState::AwaitingRetry)
        );
        assert_eq!(next_state(JobState::Processing, JobEvent::Exhaust), Ok(JobState::Dead));
        assert_eq!(next_state(JobState::Dead, JobEvent::Requeue), Ok(JobState::Pending));
    }

    #[test]
    fn every_other_edge_is_rejected() {
        let events = [
            JobEvent::Claim,
            JobEvent::Succeed,
            JobEvent::Retry,
            JobEvent::Exhaust,
            JobEvent::Requeue,
        ];
        let mut valid = 0;
        for from in JobState::ALL {
            for event in events {
                match next_state(from, event) {
                    Ok(_) => valid += 1,
                    Err(err) => {
                        assert_eq!(err.from, from);
                        assert_eq!(err.event, event);
                    }
                }
            }
        }
        assert_eq!(valid, 6);
    }

    #[test]
    fn completed_is_final_and_dead_only_requeues() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(!JobState::AwaitingRetry.is_terminal());
        assert!(next_state(JobState::Completed, JobEvent::Requeue).is_err());
        assert!(next_state(JobState::Dead, JobEvent::Claim).is_err());
    }

    #[test]
    fn retry_wait_is_gated_by_timer() {
        let now = Utc::now();
        let later = now + Duration::seconds(4);

        assert!(is_eligible(JobState::Pending, None, now));
        assert!(!is_eligible(JobState::AwaitingRetry, Some(later), now));
        assert!(is_eligible(JobState::AwaitingRetry, Some(later), later));
        assert!(!is_eligible(JobState::AwaitingRetry, None, now));
        assert!(!is_eligible(JobState::Processing, None, now));
        assert!(!is_eligible(JobState::Dead, None, now));
    }
}
