//! Fixed-window request-rate limiter, one instance per connection.

use std::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window_seconds: u64,
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter {
            max_requests,
            window_seconds,
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Returns `true` if this request is admitted under the current window.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start).as_secs() >= self.window_seconds {
            self.window_start = now;
            self.count = 1;
            return true;
        }

        if self.count >= self.max_requests {
            return false;
        }

        self.count += 1;
        true
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.window_start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn admits_up_to_max_within_window() {
        let mut limiter = RateLimiter::new(5, 1);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at(now));
        }
        assert!(!limiter.check_at(now));
    }

    #[test]
    fn reopens_window_after_elapsed_time() {
        let mut limiter = RateLimiter::new(5, 1);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at(start));
        }
        assert!(!limiter.check_at(start));
        let later = start + Duration::from_secs(2);
        assert!(limiter.check_at(later));
    }

    #[test]
    fn reset_reopens_immediately() {
        let mut limiter = RateLimiter::new(1, 1);
        let now = Instant::now();
        assert!(limiter.check_at(now));
        assert!(!limiter.check_at(now));
        limiter.reset();
        assert!(limiter.check_at(now));
    }
}
