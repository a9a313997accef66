use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Used when the configured value is unusable.
const DEFAULT_MAX_RETRIES: usize = 1;

const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Delay before the first retry of an object; doubled for every further retry.
const BASE_RETRY_DELAY_MS: u64 = 250;

/// Per-object retry bookkeeping, keyed by OID.
#[derive(Debug)]
pub struct RetryCounter {
    max_retries: usize,
    max_retry_delay: Duration,
    count: Mutex<HashMap<String, usize>>,
}

impl RetryCounter {
    /// `configured` values below 1 fall back to 1.  `force_single` pins the limit to exactly
    /// one retry, for auth schemes that cannot tolerate repeated attempts.
    pub fn new(configured: i64, force_single: bool) -> Self {
        let max_retries = if force_single {
            DEFAULT_MAX_RETRIES
        } else if configured < 1 {
            warn!("invalid max retries ({configured}), using default of {DEFAULT_MAX_RETRIES}");
            DEFAULT_MAX_RETRIES
        } else {
            usize::try_from(configured).unwrap_or(DEFAULT_MAX_RETRIES)
        };

        Self {
            max_retries,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            count: Mutex::new(HashMap::new()),
        }
    }

    /// Caps the backoff delay.  A zero cap disables the delay entirely.
    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// Records one more retry of `oid` and returns the new count.
    pub fn increment(&self, oid: &str) -> usize {
        let mut count = self.count.lock();
        let c = count.entry(oid.to_owned()).or_insert(0);
        *c += 1;
        *c
    }

    /// Retries recorded so far for `oid`; zero if it was never retried.
    pub fn count_for(&self, oid: &str) -> usize {
        self.count.lock().get(oid).copied().unwrap_or(0)
    }

    /// The current count, and whether another retry is allowed.
    pub fn can_retry(&self, oid: &str) -> (usize, bool) {
        let count = self.count_for(oid);
        (count, count < self.max_retries)
    }

    /// How long to hold back the current retry of `oid`: 250ms for the first retry, doubling
    /// with each further one, capped at the maximum retry delay.  Zero if never retried.
    pub fn retry_delay(&self, oid: &str) -> Duration {
        let count = self.count_for(oid);
        if count < 1 {
            return Duration::ZERO;
        }

        let max_ms = u64::try_from(self.max_retry_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = u32::try_from(count - 1)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .and_then(|factor| factor.checked_mul(BASE_RETRY_DELAY_MS))
            .filter(|ms| *ms <= max_ms)
            .unwrap_or(max_ms);
        Duration::from_millis(delay_ms)
    }

    /// The instant the current retry of `oid` may go out.
    pub fn ready_time(&self, oid: &str) -> Instant {
        Instant::now() + self.retry_delay(oid)
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn test_can_retry_until_max() {
        let rc = RetryCounter::new(3, false);
        assert_eq!(rc.max_retries(), 3);
        assert_eq!(rc.can_retry("oid"), (0, true));

        for i in 1..3 {
            assert_eq!(rc.increment("oid"), i);
            assert_eq!(rc.can_retry("oid"), (i, true));
        }

        assert_eq!(rc.increment("oid"), 3);
        assert_eq!(rc.can_retry("oid"), (3, false));
        assert_eq!(rc.count_for("oid"), 3);

        // Other objects have their own budget.
        assert_eq!(rc.can_retry("other"), (0, true));
        assert_eq!(rc.count_for("other"), 0);
    }

    #[test]
    #[traced_test]
    fn test_non_positive_max_falls_back_to_one() {
        for configured in [0, -1, i64::MIN] {
            assert_eq!(RetryCounter::new(configured, false).max_retries(), 1);
        }
        assert!(logs_contain("invalid max retries"));
    }

    #[test]
    fn test_retry_delay_doubles_up_to_cap() {
        let rc = RetryCounter::new(10, false).with_max_retry_delay(Duration::from_secs(1));
        assert_eq!(rc.max_retry_delay(), Duration::from_secs(1));
        assert_eq!(rc.retry_delay("oid"), Duration::ZERO);

        let expected_ms = [250, 500, 1000, 1000, 1000];
        for ms in expected_ms {
            rc.increment("oid");
            assert_eq!(rc.retry_delay("oid"), Duration::from_millis(ms));
        }

        for _ in 0..100 {
            rc.increment("oid");
        }
        assert_eq!(rc.retry_delay("oid"), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_max_delay_retries_immediately() {
        let rc = RetryCounter::new(3, false).with_max_retry_delay(Duration::ZERO);
        rc.increment("oid");
        assert_eq!(rc.retry_delay("oid"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_time() {
        let rc = RetryCounter::new(3, false);
        let now = Instant::now();
        assert_eq!(rc.ready_time("oid"), now);

        rc.increment("oid");
        rc.increment("oid");
        assert_eq!(rc.ready_time("oid"), now + Duration::from_millis(500));
    }

    #[test]
    fn test_force_single_retry() {
        let rc = RetryCounter::new(10, true);
        assert_eq!(rc.max_retries(), 1);
        assert_eq!(rc.can_retry("oid"), (0, true));
        rc.increment("oid");
        assert_eq!(rc.can_retry("oid"), (1, false));
    }
}
