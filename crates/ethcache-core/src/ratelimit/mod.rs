//! Token-bucket gate on upstream dispatch.
//!
//! A single process-wide bucket with rate `R` requests/second and burst
//! `⌊R⌋ + 1`. Only upstream calls pass through the bucket; cache hits are
//! never rate-limited.
//!
//! [`TokenBucket::acquire`] reserves a token and sleeps out the shortfall
//! when the bucket is empty, so short bursts queue rather than fail. A
//! request whose reservation would sleep longer than the wait cap is denied
//! immediately; callers surface the denial as HTTP 429. Cancellation while
//! sleeping (the client hanging up) simply drops the future.

use parking_lot::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Longest a request will queue for a token before being denied.
const MAX_TOKEN_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded: next token available in {0:?}")]
    WaitTooLong(Duration),
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket. Safe for concurrent callers.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    burst: f64,
    max_wait: Duration,
}

impl TokenBucket {
    /// Creates a bucket admitting `rate` requests/second with burst
    /// `⌊rate⌋ + 1`. The bucket starts full.
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self::with_max_wait(rate, MAX_TOKEN_WAIT)
    }

    #[must_use]
    pub fn with_max_wait(rate: f64, max_wait: Duration) -> Self {
        let burst = rate.floor() + 1.0;
        Self {
            state: Mutex::new(BucketState { tokens: burst, last_refill: Instant::now() }),
            rate,
            burst,
            max_wait,
        }
    }

    /// Takes one token, sleeping until it is available.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::WaitTooLong`] without reserving when the
    /// bucket is so far oversubscribed that the caller would sleep past the
    /// wait cap.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let wait = {
            let mut state = self.state.lock();
            let now = Instant::now();

            let elapsed = now.duration_since(state.last_refill);
            state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
            state.last_refill = now;

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                Duration::ZERO
            } else {
                let deficit = 1.0 - state.tokens;
                let wait = Duration::from_secs_f64(deficit / self.rate);
                if wait > self.max_wait {
                    return Err(RateLimitError::WaitTooLong(wait));
                }
                // Reserve now so concurrent waiters queue behind this one;
                // the balance goes negative until refill catches up.
                state.tokens -= 1.0;
                wait
            }
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    #[cfg(test)]
    fn available_tokens(&self) -> f64 {
        self.state.lock().tokens
    }
}
