// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Token bucket rate limiter with a try-acquire-only contract: callers never
//! wait for tokens, they are either available or the request is rejected.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const ONE_SECOND_NS: u64 = 1_000_000_000;

/// A token bucket holding at most `limit` tokens and replenishing `limit`
/// tokens per second.
#[derive(Clone)]
pub struct RateLimiter {
    /// * limit > 0: maximum number of acquisitions per second
    /// * limit == 0: reject everything
    /// * limit < 0: allow everything
    limit: i64,

    inner: Arc<Mutex<RateLimiterState>>,
}

struct RateLimiterState {
    tokens: i64,
    max_tokens: i64,
    last_update: Instant,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("tokens", &self.tokens())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(limit: i64) -> Self {
        let state = RateLimiterState {
            tokens: limit.max(0),
            max_tokens: limit.max(0),
            last_update: Instant::now(),
        };

        RateLimiter {
            limit,
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Consumes one token if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.limit < 0 {
            return true;
        }

        let mut state = self.inner.lock().expect("lock poisoned");

        if state.tokens >= 1 {
            state.tokens -= 1;
            return true;
        }

        self.replenish(&mut state, Instant::now());

        if state.tokens >= 1 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Current token balance, after replenishment. Best-effort: the value
    /// may be stale by the time the caller acts on it.
    pub fn tokens(&self) -> i64 {
        if self.limit == 0 {
            return 0;
        }
        if self.limit < 0 {
            return i64::MAX;
        }

        let mut state = self.inner.lock().expect("lock poisoned");
        self.replenish(&mut state, Instant::now());
        state.tokens
    }

    fn replenish(&self, state: &mut RateLimiterState, timestamp: Instant) {
        let elapsed = timestamp.duration_since(state.last_update);

        // Fractional tokens are truncated away; the window restarts on every
        // replenish.
        let tokens_to_add =
            ((elapsed.as_nanos() as f64 / ONE_SECOND_NS as f64) * self.limit as f64) as i64;

        if tokens_to_add > 0 {
            state.tokens = (state.tokens + tokens_to_add).min(state.max_tokens);
        }
        state.last_update = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_allow_all() {
        let limiter = RateLimiter::new(-1);
        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
        assert_eq!(limiter.tokens(), i64::MAX);
    }

    #[test]
    fn test_block_all() {
        let limiter = RateLimiter::new(0);
        for _ in 0..10 {
            assert!(!limiter.try_acquire());
        }
        assert_eq!(limiter.tokens(), 0);
    }

    #[test]
    fn test_burst_is_exact() {
        let limiter = RateLimiter::new(5);

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_replenish_after_wait() {
        let limiter = RateLimiter::new(5);

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        // 0.3s * 5 tokens/s = 1 whole token
        thread::sleep(Duration::from_millis(300));

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_tokens_exposes_balance() {
        let limiter = RateLimiter::new(3);
        assert_eq!(limiter.tokens(), 3);

        assert!(limiter.try_acquire());
        assert_eq!(limiter.tokens(), 2);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert_eq!(limiter.tokens(), 0);
    }

    #[test]
    fn test_thread_safety() {
        let limiter = RateLimiter::new(100);
        let limiter_clone = limiter.clone();

        let handle = thread::spawn(move || {
            (0..100).filter(|_| limiter_clone.try_acquire()).count()
        });
        let main_allowed = (0..100).filter(|_| limiter.try_acquire()).count();
        let thread_allowed = handle.join().unwrap();

        let total = main_allowed + thread_allowed;
        assert!(
            (95..=105).contains(&total),
            "expected around 100 allowed requests, got {total}"
        );
    }
}
