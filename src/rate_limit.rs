use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);

/// In-memory rate limiter keyed by (bucket, ip_hash).
/// Each bucket (e.g. "login", "comment") has its own max attempts and window.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // A panic while holding the lock leaves only timestamps behind.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an attempt and return true if the attempt is allowed (under the limit).
    /// `key` should be something like "login:<ip_hash>" or "comment:<ip_hash>".
    pub fn check_and_record(&self, key: &str, max_attempts: u64, window: Duration) -> bool {
        let mut map = self.lock();
        let now = Instant::now();

        let attempts = map.entry(key.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < window);

        if (attempts.len() as u64) < max_attempts {
            attempts.push(now);
            true
        } else {
            false
        }
    }

    /// Check remaining attempts without recording a new one.
    pub fn remaining(&self, key: &str, max_attempts: u64, window: Duration) -> u64 {
        let map = self.lock();
        let now = Instant::now();
        let used = map
            .get(key)
            .map(|attempts| {
                attempts
                    .iter()
                    .filter(|t| now.duration_since(**t) < window)
                    .count()
            })
            .unwrap_or(0);
        max_attempts.saturating_sub(used as u64)
    }

    /// Forget attempts for `key`, e.g. after a successful login.
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Drop attempts older than `max_age`; called from the maintenance task.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let mut map = self.lock();
        let now = Instant::now();
        map.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < max_age);
            !attempts.is_empty()
        });
        map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_attempts() {
        let limiter = RateLimiter::new();
        assert!(limiter.check_and_record("login:a", 2, HOUR));
        assert!(limiter.check_and_record("login:a", 2, HOUR));
        assert!(!limiter.check_and_record("login:a", 2, HOUR));
        assert_eq!(limiter.remaining("login:a", 2, HOUR), 0);
        // other keys are independent
        assert!(limiter.check_and_record("login:b", 2, HOUR));
    }

    #[test]
    fn expired_attempts_do_not_count() {
        let limiter = RateLimiter::new();
        assert!(limiter.check_and_record("k", 1, Duration::ZERO));
        assert!(limiter.check_and_record("k", 1, Duration::ZERO));
        assert_eq!(limiter.cleanup(Duration::ZERO), 0);
    }

    #[test]
    fn reset_clears_a_key() {
        let limiter = RateLimiter::new();
        assert!(limiter.check_and_record("k", 1, HOUR));
        limiter.reset("k");
        assert_eq!(limiter.remaining("k", 1, HOUR), 1);
    }
}
