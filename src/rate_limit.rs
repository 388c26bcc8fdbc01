use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter keyed by client identity.
///
/// A window that has elapsed is simply replaced on the next request, so the
/// previous window's count is discarded rather than slid. That permits brief
/// bursts of up to twice the cap at window boundaries, which is the intended
/// tradeoff for keeping the bookkeeping synchronous and lock-free.
pub struct FixedWindowLimiter {
    windows: DashMap<String, WindowEntry>,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> FixedWindowLimiter {
        FixedWindowLimiter {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Admit or reject one request from `client_id`, updating its window.
    ///
    /// Concurrent requests from the same client race on the counter; a slight
    /// over/under-count under true concurrency is tolerated.
    pub fn check(&self, client_id: &str) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + self.window,
            });

        if now > entry.reset_at {
            // Window elapsed, start a fresh one.
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        let reset_in_ms = entry.reset_at.saturating_duration_since(now).as_millis() as u64;

        if entry.count >= self.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_in_ms,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            reset_in_ms,
        }
    }

    /// Drop windows that have already elapsed so the map stays bounded.
    /// Run periodically from a background task.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows.retain(|_, entry| now <= entry.reset_at);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[test]
fn test_window_admits_up_to_cap() {
    let limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));

    let first = limiter.check("1.2.3.4");
    assert!(first.allowed);
    assert_eq!(first.remaining, 2);
    assert!(first.reset_in_ms > 0);

    assert_eq!(limiter.check("1.2.3.4").remaining, 1);
    assert_eq!(limiter.check("1.2.3.4").remaining, 0);

    let denied = limiter.check("1.2.3.4");
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(denied.reset_in_ms > 0);
}

#[test]
fn test_clients_do_not_share_windows() {
    let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));

    assert!(limiter.check("a").allowed);
    assert!(!limiter.check("a").allowed);
    assert!(limiter.check("b").allowed);
}

#[test]
fn test_elapsed_window_is_replaced() {
    let limiter = FixedWindowLimiter::new(1, Duration::from_millis(20));

    assert!(limiter.check("a").allowed);
    assert!(!limiter.check("a").allowed);

    std::thread::sleep(Duration::from_millis(40));

    let fresh = limiter.check("a");
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 0);
}

#[test]
fn test_purge_drops_stale_entries() {
    let limiter = FixedWindowLimiter::new(5, Duration::from_millis(20));

    limiter.check("a");
    limiter.check("b");
    assert_eq!(limiter.tracked_clients(), 2);

    std::thread::sleep(Duration::from_millis(40));
    limiter.purge_expired();
    assert_eq!(limiter.tracked_clients(), 0);
}
