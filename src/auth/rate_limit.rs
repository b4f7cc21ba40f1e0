//! Per-caller token-bucket rate limiting.
//!
//! One bucket per verified caller identity, refilled at the configured
//! request rate with a configurable burst. Backed by `governor`'s keyed
//! limiter so unrelated callers never contend on each other's budget.

use crate::types::{AppError, Result};
use governor::{
    clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter,
};
use std::num::NonZeroU32;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Keyed token bucket. A zero request rate disables limiting entirely.
pub struct CallerRateLimiter {
    limiter: Option<KeyedLimiter>,
}

impl CallerRateLimiter {
    /// Build a limiter allowing `requests_per_second` sustained with a
    /// burst of `burst`. Pass `requests_per_second = 0` to disable.
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_second).map(|rate| {
            let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
            RateLimiter::keyed(Quota::per_second(rate).allow_burst(burst))
        });
        Self { limiter }
    }

    /// A limiter that never rejects.
    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    /// Charge one request to the caller's bucket.
    pub fn check(&self, caller: &str) -> Result<()> {
        match &self.limiter {
            Some(limiter) => limiter
                .check_key(&caller.to_string())
                .map_err(|_| AppError::RateLimited(format!("caller {caller} over budget"))),
            None => Ok(()),
        }
    }
}
