//! Retry backoff policy for transient delivery failures
//!
//! Exponential with a cap, plus multiplicative jitter so a burst of
//! failures against one provider does not retry in lockstep.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Exponential backoff policy
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_secs: u64,
    cap_secs: u64,
}

impl BackoffPolicy {
    pub fn new(base_secs: u64, cap_secs: u64) -> Self {
        Self {
            base_secs: base_secs.max(1),
            cap_secs: cap_secs.max(1),
        }
    }

    /// Deterministic delay for the given attempt number (1-based),
    /// before jitter: base * 2^(attempt-1), capped.
    pub fn delay_secs(&self, attempt: i32) -> u64 {
        let attempt = attempt.max(1) as u32;
        let exp = attempt.saturating_sub(1).min(20);
        self.base_secs
            .saturating_mul(1u64 << exp)
            .min(self.cap_secs)
    }

    /// Next attempt time for the given attempt number, with jitter in
    /// [0.5, 1.5) of the deterministic delay.
    pub fn next_attempt_at(&self, attempt: i32) -> DateTime<Utc> {
        let delay = self.delay_secs(attempt) as f64;
        let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = (delay * factor).max(1.0) as i64;
        Utc::now() + Duration::seconds(jittered)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(30, 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = BackoffPolicy::new(30, 3600);
        assert_eq!(policy.delay_secs(1), 30);
        assert_eq!(policy.delay_secs(2), 60);
        assert_eq!(policy.delay_secs(3), 120);
        assert_eq!(policy.delay_secs(4), 240);
    }

    #[test]
    fn test_delay_respects_cap() {
        let policy = BackoffPolicy::new(30, 3600);
        assert_eq!(policy.delay_secs(8), 3600);
        assert_eq!(policy.delay_secs(30), 3600);
    }

    #[test]
    fn test_zero_and_negative_attempts_clamp_to_first() {
        let policy = BackoffPolicy::new(30, 3600);
        assert_eq!(policy.delay_secs(0), 30);
        assert_eq!(policy.delay_secs(-5), 30);
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = BackoffPolicy::new(30, 3600);
        for attempt in 1..=5 {
            let at = policy.next_attempt_at(attempt);
            let delta = (at - Utc::now()).num_seconds();
            let base = policy.delay_secs(attempt) as i64;
            assert!(delta >= base / 2 - 1, "attempt {}: delta {} too small", attempt, delta);
            assert!(delta <= base * 3 / 2 + 1, "attempt {}: delta {} too large", attempt, delta);
        }
    }
}
