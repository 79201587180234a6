use rand::Rng;
use std::time::Duration;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed backoff schedule for one upstream.
///
/// `delays[i]` is slept before retry `i + 1`, so a table of N delays allows
/// N + 1 attempts. Each delay is scaled by a random factor in
/// `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
    jitter: f64,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>, jitter: f64) -> Self {
        Self {
            delays,
            jitter: jitter.clamp(0.0, 0.9),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn from_millis(delays_ms: &[u64], jitter: f64) -> Self {
        Self::new(
            delays_ms.iter().copied().map(Duration::from_millis).collect(),
            jitter,
        )
    }

    pub fn cdp() -> Self {
        Self::from_millis(&[300, 800, 1500], 0.25)
    }

    pub fn facilitator() -> Self {
        Self::from_millis(&[300, 800], 0.33)
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout.min(DEFAULT_ATTEMPT_TIMEOUT);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Delay to sleep after failed attempt `attempt` (0-based), or `None`
    /// once the schedule is exhausted.
    pub fn backoff_after(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).map(|base| self.jittered(*base))
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        base.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedules() {
        let cdp = RetryPolicy::cdp();
        assert_eq!(cdp.max_attempts(), 4);
        assert_eq!(cdp.delays()[2], Duration::from_millis(1500));

        let facilitator = RetryPolicy::facilitator();
        assert_eq!(facilitator.max_attempts(), 3);
        assert_eq!(facilitator.attempt_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy::from_millis(&[300, 800], 0.3).without_jitter();
        assert_eq!(policy.backoff_after(0), Some(Duration::from_millis(300)));
        assert_eq!(policy.backoff_after(1), Some(Duration::from_millis(800)));
        assert_eq!(policy.backoff_after(2), None);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::from_millis(&[1000], 0.25);
        for _ in 0..200 {
            let delay = policy.backoff_after(0).unwrap();
            assert!(delay >= Duration::from_millis(750), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1250), "{:?}", delay);
        }
    }

    #[test]
    fn attempt_timeout_is_capped() {
        let policy = RetryPolicy::cdp().with_attempt_timeout(Duration::from_secs(60));
        assert_eq!(policy.attempt_timeout(), DEFAULT_ATTEMPT_TIMEOUT);
    }
}
