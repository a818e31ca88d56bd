//! Retry with exponential backoff behind a circuit breaker and rate limiter

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig};

/// Errors that know whether another attempt can help
pub trait RetryableError: std::fmt::Display {
    fn circuit_open() -> Self;
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// base, 2×base, 4×base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Shared request guard for one upstream host
#[derive(Debug, Clone)]
pub struct RequestGuard {
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    rate_limiter: RateLimiter,
    policy: RetryPolicy,
}

impl RequestGuard {
    pub fn new(
        policy: RetryPolicy,
        rate_limiter: RateLimiterConfig,
        circuit_breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            circuit_breaker: Arc::new(Mutex::new(CircuitBreaker::new(circuit_breaker))),
            rate_limiter: RateLimiter::new(rate_limiter),
            policy,
        }
    }

    /// Run `operation`, retrying retryable failures with backoff.
    ///
    /// Non-retryable failures (bad request, rejected order) are returned at
    /// once and do not count against the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        {
            let mut cb = self.circuit_breaker.lock().await;
            if !cb.can_attempt() {
                return Err(E::circuit_open());
            }
        }

        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                tracing::debug!("Retrying after {}ms", delay.as_millis());
                sleep(delay).await;
            }

            self.rate_limiter.acquire().await;

            match operation().await {
                Ok(result) => {
                    self.circuit_breaker.lock().await.record_success();
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.policy.max_retries + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        self.circuit_breaker.lock().await.record_failure();
        Err(last_error.unwrap_or_else(E::circuit_open))
    }
}

impl Default for RequestGuard {
    fn default() -> Self {
        Self::new(
            RetryPolicy::default(),
            RateLimiterConfig::default(),
            CircuitBreakerConfig::default(),
        )
    }
}
