use std::time::Duration;

pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(2000);

/// Delay to wait after failed attempt `attempt` (1-based) before the next one.
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> BackoffPolicy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// `attempt × step`: 2s, 4s, 6s, ... with the default step.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub step: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        LinearBackoff {
            step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl BackoffPolicy for LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_by_two_seconds() {
        let backoff = LinearBackoff::default();
        let delays: Vec<u128> = (1..=3).map(|a| backoff.delay(a).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 6000]);
    }

    #[test]
    fn closures_are_policies() {
        let exponential = |attempt: u32| Duration::from_millis(100 * 2u64.pow(attempt - 1));
        assert_eq!(exponential.delay(1), Duration::from_millis(100));
        assert_eq!(exponential.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn huge_attempts_saturate() {
        let backoff = LinearBackoff {
            step: Duration::MAX,
        };
        assert_eq!(backoff.delay(2), Duration::MAX);
    }
}
