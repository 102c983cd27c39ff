//! Per-client fixed-window rate limiting for the isolation gate.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter keyed by client address. Windows reset lazily
/// on the first request after expiry; stale keys are swept whenever
/// the map grows past a threshold.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
}

const SWEEP_THRESHOLD: usize = 10_000;

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    /// One request per minute granularity used by the isolation gate.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Record a request from `client` and report whether it is allowed.
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> bool {
        let allowed = {
            let mut entry = self
                .windows
                .entry(client.to_string())
                .or_insert_with(|| Window {
                    started: now,
                    count: 0,
                });
            if now.duration_since(entry.started) >= self.window {
                entry.started = now;
                entry.count = 0;
            }
            entry.count += 1;
            entry.count <= self.limit
        };

        if self.windows.len() > SWEEP_THRESHOLD {
            self.sweep(now);
        }
        allowed
    }

    fn sweep(&self, now: Instant) {
        let window = self.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::per_minute(3);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[test]
    fn clients_are_tracked_independently() {
        let limiter = RateLimiter::per_minute(1);
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("10.0.0.1", start));
        assert!(!limiter.check_at("10.0.0.1", start + Duration::from_secs(30)));
        assert!(limiter.check_at("10.0.0.1", start + Duration::from_secs(61)));
    }
}
