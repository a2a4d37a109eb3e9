//! Concurrency and request-start rate limiting.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

/// Caps in-flight requests and request starts per window.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    slots: Arc<Semaphore>,
    starts: Mutex<VecDeque<Instant>>,
    per_window: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(concurrency: usize, per_window: usize, window: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            starts: Mutex::new(VecDeque::new()),
            per_window: per_window.max(1),
            window,
        }
    }

    /// Waits for a concurrency slot and a start within the rate window.
    ///
    /// The slot is released when the returned permit drops. The semaphore
    /// is never closed, so the permit is always present in practice.
    pub(crate) async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = self.slots.clone().acquire_owned().await.ok();
        loop {
            let wait_until = {
                let mut starts = self.starts.lock();
                let now = Instant::now();
                while starts
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    starts.pop_front();
                }
                if starts.len() < self.per_window {
                    starts.push_back(now);
                    return permit;
                }
                match starts.front() {
                    Some(oldest) => *oldest + self.window,
                    None => now,
                }
            };
            sleep_until(wait_until).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_are_spread_across_windows() {
        let limiter = RateLimiter::new(10, 3, Duration::from_secs(1));
        let begin = Instant::now();

        let mut permits = Vec::new();
        for _ in 0..3 {
            permits.push(limiter.acquire().await);
        }
        assert!(begin.elapsed() < Duration::from_millis(10));

        permits.push(limiter.acquire().await);
        assert!(begin.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let limiter = RateLimiter::new(2, 100, Duration::from_secs(1));
        let a = limiter.acquire().await;
        let _b = limiter.acquire().await;
        assert_eq!(limiter.available(), 0);

        drop(a);
        assert_eq!(limiter.available(), 1);
    }
}
