//! Token-bucket rate limiter shared by the REST clients
//!
//! The bucket holds `max_requests_per_second` permits; each request consumes
//! one and the bucket is refilled in whole intervals.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests_per_second: usize,
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 20,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, requests_per_second: usize) -> Self {
        self.max_requests_per_second = requests_per_second.max(1);
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

/// Clones share one bucket
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    max_permits: usize,
    last_refill: Arc<Mutex<Instant>>,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let max_permits = config.max_requests_per_second.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_permits)),
            max_permits,
            last_refill: Arc::new(Mutex::new(Instant::now())),
            refill_interval: config.refill_interval,
        }
    }

    pub fn with_rate(requests_per_second: usize) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(requests_per_second))
    }

    /// Wait until a permit is available and consume it
    pub async fn acquire(&self) {
        loop {
            self.refill().await;
            if let Ok(permit) = self.permits.try_acquire() {
                permit.forget();
                return;
            }
            tokio::time::sleep(self.refill_interval / 10).await;
        }
    }

    /// Consume a permit if one is available right now
    pub async fn try_acquire(&self) -> bool {
        self.refill().await;
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        let elapsed = last_refill.elapsed();
        if elapsed < self.refill_interval {
            return;
        }

        let missing = self
            .max_permits
            .saturating_sub(self.permits.available_permits());
        if missing > 0 {
            self.permits.add_permits(missing);
        }
        *last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_exhausts() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(2)
                .with_refill_interval(Duration::from_secs(60)),
        );

        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert_eq!(limiter.available_permits(), 0);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_refills_after_interval() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(1)
                .with_refill_interval(Duration::from_millis(20)),
        );

        limiter.acquire().await;
        assert!(!limiter.try_acquire().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(1)
                .with_refill_interval(Duration::from_millis(20)),
        );
        let shared = limiter.clone();

        limiter.acquire().await;
        let start = Instant::now();
        shared.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
