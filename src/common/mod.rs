//! Resilience utilities shared by the market data and broker clients
//!
//! - Circuit breaker for fault tolerance
//! - Rate limiter using token bucket algorithm
//! - Retry logic with exponential backoff

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RequestGuard, RetryPolicy, RetryableError};
