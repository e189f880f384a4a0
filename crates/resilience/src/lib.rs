//! Resilience controls for calls to the translation provider: a token-bucket
//! rate limiter, exponential backoff with jitter, and a circuit breaker.

mod backoff;
mod breaker;
mod token_bucket;

pub use {
    backoff::{BackoffConfig, ExponentialBackoff},
    breaker::CircuitBreaker,
    token_bucket::TokenBucket,
};
