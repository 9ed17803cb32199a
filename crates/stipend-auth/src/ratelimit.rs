//! Fixed-window rate limiting.
//!
//! A sliding counter keyed by caller identity, reset once the window
//! has elapsed. Independent of every other store; used at the
//! connect-code exchange endpoint.

use std::collections::HashMap;
use std::sync::Mutex;

struct Window {
    started_at: i64,
    count: u32,
}

/// Counter-per-key rate limiter.
pub struct RateLimiter {
    window_ms: i64,
    max_per_window: u32,
    entries: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_per_window: u32) -> Self {
        Self {
            window_ms,
            max_per_window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `key`. Returns false once the caller has
    /// exhausted the current window.
    pub fn check(&self, key: &str, now: i64) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let window = entries.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now - window.started_at >= self.window_ms {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_per_window {
            return false;
        }
        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_within_window() {
        let limiter = RateLimiter::new(60_000, 3);
        assert!(limiter.check("agent-a", 0));
        assert!(limiter.check("agent-a", 1));
        assert!(limiter.check("agent-a", 2));
        assert!(!limiter.check("agent-a", 3));
    }

    #[test]
    fn window_elapse_resets() {
        let limiter = RateLimiter::new(60_000, 1);
        assert!(limiter.check("agent-a", 0));
        assert!(!limiter.check("agent-a", 59_999));
        assert!(limiter.check("agent-a", 60_000));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(60_000, 1);
        assert!(limiter.check("agent-a", 0));
        assert!(limiter.check("agent-b", 0));
        assert!(!limiter.check("agent-a", 1));
    }
}
