use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::jobs::settings::QueueSettings;

/// `9999-12-31T23:59:59Z`, the last instant `TIMEFMT` can represent.
const FAR_FUTURE_SECS: i64 = 253_402_300_799;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_base: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff_base: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        attempts: u32,
        delay_secs: u64,
        next_retry_at: DateTime<Utc>,
    },
    Dead {
        attempts: u32,
    },
}

impl RetryPolicy {
    pub fn new(backoff_base: u32) -> Self {
        Self {
            backoff_base: backoff_base.max(1),
        }
    }

    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self::new(settings.backoff_base)
    }

    /// `backoff_base ^ attempts` seconds. Unbounded; saturates instead of
    /// overflowing.
    pub fn delay_secs(&self, attempts: u32) -> u64 {
        u64::from(self.backoff_base).saturating_pow(attempts)
    }

    /// Decide what happens after a failed attempt. `attempts` is the count
    /// before this failure.
    pub fn next_attempt(&self, attempts: u32, max_retries: u32, now: DateTime<Utc>) -> RetryDecision {
        let attempts = attempts.saturating_add(1);
        if attempts > max_retries {
            return RetryDecision::Dead { attempts };
        }

        let delay_secs = self.delay_secs(attempts);
        RetryDecision::Retry {
            attempts,
            delay_secs,
            next_retry_at: add_secs_saturating(now, delay_secs),
        }
    }
}

fn add_secs_saturating(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let far_future = Utc
        .timestamp_opt(FAR_FUTURE_SECS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let remaining = (far_future - now).num_seconds().max(0);
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(remaining);
    now + Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::{format_ts, parse_ts};

    fn t0() -> DateTime<Utc> {
        parse_ts("2024-05-01T12:00:00Z").unwrap()
    }

    #[test]
    fn delays_grow_as_powers_of_the_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_secs(1), 2);
        assert_eq!(policy.delay_secs(2), 4);
        assert_eq!(policy.delay_secs(3), 8);

        let base3 = RetryPolicy::new(3);
        assert_eq!(base3.delay_secs(3), 27);
    }

    #[test]
    fn base_one_retries_every_second() {
        let policy = RetryPolicy::new(1);
        assert_eq!(policy.delay_secs(1), 1);
        assert_eq!(policy.delay_secs(10), 1);
        assert_eq!(RetryPolicy::new(0).backoff_base, 1);
    }

    #[test]
    fn retries_until_budget_then_dead() {
        let policy = RetryPolicy::default();

        match policy.next_attempt(0, 2, t0()) {
            RetryDecision::Retry {
                attempts,
                delay_secs,
                next_retry_at,
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(delay_secs, 2);
                assert_eq!(format_ts(next_retry_at), "2024-05-01T12:00:02Z");
            }
            other => panic!("expected retry, got {other:?}"),
        }

        match policy.next_attempt(1, 2, t0()) {
            RetryDecision::Retry { attempts, delay_secs, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(delay_secs, 4);
            }
            other => panic!("expected retry, got {other:?}"),
        }

        assert_eq!(policy.next_attempt(2, 2, t0()), RetryDecision::Dead { attempts: 3 });
    }

    #[test]
    fn zero_retries_dies_on_first_failure() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_attempt(0, 0, t0()), RetryDecision::Dead { attempts: 1 });
    }

    #[test]
    fn huge_delays_saturate_at_far_future() {
        let policy = RetryPolicy::new(10);
        match policy.next_attempt(39, 100, t0()) {
            RetryDecision::Retry {
                delay_secs,
                next_retry_at,
                ..
            } => {
                assert_eq!(delay_secs, u64::MAX);
                assert_eq!(format_ts(next_retry_at), "9999-12-31T23:59:59Z");
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }
}
