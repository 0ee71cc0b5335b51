//! Sliding-window login rate limiting, keyed per client IP. Same
//! retain-then-push approach as the platform's general-purpose rate
//! limiter, narrowed to the one thing the gateway needs: 10 login attempts
//! per minute per IP.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const MAX_ATTEMPTS: usize = 10;
pub const WINDOW_SECS: u64 = 60;

pub struct RateLimiter {
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn cleanup(entries: &mut Vec<Instant>, now: Instant, window: Duration) {
        entries.retain(|t| now.duration_since(*t) < window);
    }

    /// Returns `Ok(())` if under the limit, `Err(retry_after_secs)` otherwise.
    /// Does not record an attempt either way — callers record separately
    /// after their own lockout checks pass, mirroring the staged checks of
    /// the original login flow.
    pub fn check(&self, ip: &str) -> Result<(), u64> {
        let window = Duration::from_secs(WINDOW_SECS);
        let now = Instant::now();
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let entries = attempts.entry(ip.to_string()).or_default();
        Self::cleanup(entries, now, window);

        if entries.len() >= MAX_ATTEMPTS {
            let oldest = *entries.iter().min().expect("non-empty after len check");
            let elapsed = now.duration_since(oldest);
            let retry_after = (window - elapsed).as_secs() + 1;
            return Err(retry_after);
        }
        Ok(())
    }

    pub fn record(&self, ip: &str) {
        let now = Instant::now();
        let window = Duration::from_secs(WINDOW_SECS);
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let entries = attempts.entry(ip.to_string()).or_default();
        entries.push(now);
        Self::cleanup(entries, now, window);
    }

    pub fn reset(&self, ip: &str) {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).remove(ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_ATTEMPTS {
            assert!(limiter.check("1.2.3.4").is_ok());
            limiter.record("1.2.3.4");
        }
        assert!(limiter.check("1.2.3.4").is_err());
    }

    #[test]
    fn tracks_ips_independently() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_ATTEMPTS {
            limiter.record("1.2.3.4");
        }
        assert!(limiter.check("1.2.3.4").is_err());
        assert!(limiter.check("5.6.7.8").is_ok());
    }

    #[test]
    fn reset_clears_the_window() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_ATTEMPTS {
            limiter.record("1.2.3.4");
        }
        assert!(limiter.check("1.2.3.4").is_err());
        limiter.reset("1.2.3.4");
        assert!(limiter.check("1.2.3.4").is_ok());
    }
}
