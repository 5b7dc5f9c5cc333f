use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter_frac: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter_frac: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        exponential_jitter_backoff(
            self.base,
            attempt.saturating_sub(1),
            self.max,
            self.jitter_frac,
        )
    }

    /// Server-advised waits are honoured but never beyond `max`.
    pub fn clamp(&self, wait: Duration) -> Duration {
        wait.min(self.max)
    }
}

pub fn exponential_jitter_backoff(
    base: Duration,
    attempt: u32,
    max: Duration,
    jitter_frac: f32,
) -> Duration {
    let capped_attempt = attempt.min(8);
    let factor = 1u32 << capped_attempt;
    let raw = base.saturating_mul(factor);
    let capped = raw.min(max);
    let nanos = capped.as_nanos() as i128;
    let jitter = ((nanos as f64) * (jitter_frac as f64)).round() as i128;
    let delta = if jitter > 0 {
        fastrand::i128(-jitter..=jitter)
    } else {
        0
    };
    let result = (nanos + delta).max(0) as u128;
    Duration::from_nanos(result as u64)
}
