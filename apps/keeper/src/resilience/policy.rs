use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::resilience::cancel::CancellationToken;
use crate::resilience::error::OperationError;

pub type RetryPredicate = Arc<dyn Fn(&OperationError) -> bool + Send + Sync>;
pub type RetryCallback = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Passed to the `on_retry` callback before each backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub delay: Duration,
    pub error: OperationError,
}

/// Default retry classification: timeouts, 5xx, 408 and 429 are retried,
/// other 4xx are not, and unclassified failures are.
pub fn is_retryable(error: &OperationError) -> bool {
    match error {
        OperationError::Timeout(_) | OperationError::Failed(_) => true,
        OperationError::Status { status, .. } => {
            matches!(status, 408 | 429) || !(400..500).contains(status)
        }
        OperationError::Cancelled
        | OperationError::Rejected(_)
        | OperationError::RetryExhausted { .. } => false,
    }
}

/// Bounded retry-with-backoff configuration.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one; values below 1 count as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Uniform jitter as a fraction of the computed delay (0.25 = ±25%).
    pub jitter: f64,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    pub retry_if: Option<RetryPredicate>,
    pub on_retry: Option<RetryCallback>,
    pub cancel: Option<CancellationToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            exponential_base: 2.0,
            jitter: 0.25,
            timeout: None,
            retry_if: None,
            on_retry: None,
            cancel: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("exponential_base", &self.exponential_base)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn retry_if(
        mut self,
        predicate: impl Fn(&OperationError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn on_retry(mut self, callback: impl Fn(&RetryEvent) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Cancellation always ends the loop, whatever the predicate says.
    pub fn should_retry(&self, error: &OperationError) -> bool {
        if error.is_cancelled() {
            return false;
        }
        match &self.retry_if {
            Some(predicate) => predicate(error),
            None => is_retryable(error),
        }
    }

    /// Unjittered delay after failed attempt `attempt` (1-based):
    /// `min(base * exponential_base^(attempt-1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Backoff delay with uniform jitter applied, clamped to `max_delay`.
    pub fn jittered_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.backoff_delay(attempt);
        let spread = self.jitter.clamp(0.0, 1.0);
        if spread == 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rng.random_range(-spread..=spread);
        delay.mul_f64(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_backoff_sequence_is_capped() {
        let policy = RetryPolicy::default().with_delays(ms(1000), ms(8000));
        let delays: Vec<_> = (1..=6).map(|a| policy.backoff_delay(a)).collect();
        assert_eq!(
            delays,
            vec![ms(1000), ms(2000), ms(4000), ms(8000), ms(8000), ms(8000)]
        );
    }

    #[test]
    fn test_huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(u32::MAX), policy.max_delay);
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::default().with_delays(ms(1000), ms(8000));
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=5 {
            let base = policy.backoff_delay(attempt).as_secs_f64();
            for _ in 0..200 {
                let jittered = policy.jittered_delay(attempt, &mut rng).as_secs_f64();
                assert!(jittered >= base * 0.75 - 1e-9, "{jittered} < 0.75 * {base}");
                assert!(jittered <= base * 1.25 + 1e-9, "{jittered} > 1.25 * {base}");
                assert!(jittered <= 8.0 + 1e-9);
            }
        }
    }

    #[test]
    fn test_without_jitter_is_exact() {
        let policy = RetryPolicy::default().without_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.jittered_delay(2, &mut rng), ms(2000));
    }

    #[test]
    fn test_default_classification() {
        let status = |s: u16| OperationError::Status {
            status: s,
            message: String::new(),
        };
        assert!(is_retryable(&status(500)));
        assert!(is_retryable(&status(503)));
        assert!(is_retryable(&status(408)));
        assert!(is_retryable(&status(429)));
        assert!(!is_retryable(&status(404)));
        assert!(!is_retryable(&status(400)));
        assert!(is_retryable(&OperationError::Timeout(ms(5))));
        assert!(is_retryable(&OperationError::failed("connection reset")));
        assert!(!is_retryable(&OperationError::Rejected("quota".into())));
        assert!(!is_retryable(&OperationError::Cancelled));
    }

    #[test]
    fn test_custom_predicate_cannot_retry_cancellation() {
        let policy = RetryPolicy::default().retry_if(|_| true);
        assert!(policy.should_retry(&OperationError::Rejected("x".into())));
        assert!(!policy.should_retry(&OperationError::Cancelled));
    }
}
