//! Sliding-window admission control for outbound classifier calls.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Admits at most `max_calls` calls in any rolling `window`.
///
/// Waiting callers poll; there is no queue and no fairness between them.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_calls: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_calls` per `window`.
    #[must_use]
    pub fn new(window: Duration, max_calls: usize) -> Self {
        Self {
            window,
            max_calls,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Length of the rolling window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Maximum calls admitted per window.
    #[must_use]
    pub const fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Try to admit one call now.
    ///
    /// Records the call and returns `true` if fewer than `max_calls` calls
    /// were admitted within the window; otherwise returns `false` and
    /// records nothing.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut calls, now);

        if calls.len() < self.max_calls {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Wait until a call is admitted, checking every `poll_delay`.
    pub async fn acquire(&self, poll_delay: Duration) {
        let mut waited = 0_u32;
        while !self.admit() {
            if waited == 0 {
                debug!(
                    "Rate limit of {} calls per {:?} reached, waiting",
                    self.max_calls, self.window
                );
            }
            waited += 1;
            tokio::time::sleep(poll_delay).await;
        }
        if waited > 0 {
            debug!("Admitted after {waited} poll(s)");
        }
    }

    /// Number of calls currently counted against the window.
    pub fn in_window(&self) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut calls, Instant::now());
        calls.len()
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while calls
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
        {
            calls.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Barrier;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_cap() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);

        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
        assert_eq!(limiter.in_window(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_until_oldest_ages_out() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);

        assert!(limiter.admit());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit());
        assert!(!limiter.admit());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!limiter.admit());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.admit());
        assert!(!limiter.admit());
        assert_eq!(limiter.in_window(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cap_never_admits() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 0);
        assert!(!limiter.admit());
        assert_eq!(limiter.in_window(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_window() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 1);
        limiter.acquire(Duration::from_secs(1)).await;

        let start = Instant::now();
        limiter.acquire(Duration::from_secs(1)).await;

        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cap_does_not_preallocate() {
        let limiter = RateLimiter::new(Duration::from_secs(60), usize::MAX);
        assert!(limiter.admit());
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_callers_never_exceed_cap() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60), 5));
        let start = Arc::new(Barrier::new(64));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let limiter = Arc::clone(&limiter);
            let start = Arc::clone(&start);
            handles.push(tokio::spawn(async move {
                start.wait().await;
                (0..10).filter(|_| limiter.admit()).count()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            admitted += handle.await.unwrap_or(0);
        }
        assert_eq!(admitted, 5);
        assert_eq!(limiter.in_window(), 5);
    }
}
