//! Exponential backoff with jitter, per `Settings.retry`.

use rand::Rng;
use std::time::Duration;

use crate::kernel::jobs::settings::RetrySettings;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts,
            base_delay_seconds: s.base_delay_seconds,
            max_delay_seconds: s.max_delay_seconds,
        }
    }
}

impl RetryPolicy {
    /// `delay(n) = min(base * 2^(n-1), cap) * (0.5 + U[0,1))`, `n` 1-based.
    pub fn delay(&self, attempt: i32) -> Duration {
        let exp = self.base_delay_seconds * 2f64.powi(attempt - 1);
        let capped = exp.min(self.max_delay_seconds);
        let jitter = 0.5 + rand::thread_rng().gen_range(0.0..1.0);
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }

    pub fn has_attempts_remaining(&self, retry_count: i32) -> bool {
        retry_count < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
        }
    }

    #[test]
    fn delay_grows_within_jittered_exponential_bounds() {
        let p = policy();
        for attempt in 1..=5 {
            let d = p.delay(attempt).as_secs_f64();
            let exp = (p.base_delay_seconds * 2f64.powi(attempt - 1)).min(p.max_delay_seconds);
            assert!(d >= exp * 0.5 - 1e-9);
            assert!(d <= exp * 1.5 + 1e-9);
        }
    }

    #[test]
    fn delay_never_exceeds_cap_times_jitter_bound() {
        let p = policy();
        let d = p.delay(10).as_secs_f64();
        assert!(d <= p.max_delay_seconds * 1.5 + 1e-9);
    }

    #[test]
    fn attempts_remaining_respects_max() {
        let p = policy();
        assert!(p.has_attempts_remaining(0));
        assert!(p.has_attempts_remaining(2));
        assert!(!p.has_attempts_remaining(3));
    }
}
