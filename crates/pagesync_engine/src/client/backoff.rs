//! Exponential backoff for 429 responses.

use std::time::Duration;

/// What to do after a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateLimitDelay {
    /// Long pause taken first, after too many consecutive 429s.
    pub(crate) cooldown: Option<Duration>,
    /// Delay before the retry.
    pub(crate) delay: Duration,
}

#[derive(Debug)]
pub(crate) struct RateLimitBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    consecutive: u32,
    pause_after: u32,
    cooldown: Duration,
}

impl RateLimitBackoff {
    pub(crate) fn new(initial: Duration, max: Duration, pause_after: u32, cooldown: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            consecutive: 0,
            pause_after: pause_after.max(1),
            cooldown,
        }
    }

    /// Records a 429. A server hint wins over the running delay; both are
    /// capped at the maximum.
    pub(crate) fn on_rate_limited(&mut self, retry_after: Option<Duration>) -> RateLimitDelay {
        self.consecutive += 1;
        let cooldown = if self.consecutive >= self.pause_after {
            self.consecutive = 0;
            self.current = self.initial;
            Some(self.cooldown)
        } else {
            None
        };
        let delay = retry_after.unwrap_or(self.current).min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        RateLimitDelay { cooldown, delay }
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive = 0;
        self.current = self.initial;
    }

    pub(crate) fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> RateLimitBackoff {
        RateLimitBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(32),
            5,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn doubles_up_to_the_cap() {
        let mut b = backoff();
        let delays: Vec<u64> = (0..4)
            .map(|_| b.on_rate_limited(None).delay.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let mut b = backoff();
        assert_eq!(
            b.on_rate_limited(Some(Duration::from_secs(7))).delay,
            Duration::from_secs(7)
        );
        assert_eq!(
            b.on_rate_limited(Some(Duration::from_secs(300))).delay,
            Duration::from_secs(32)
        );
    }

    #[test]
    fn long_pause_after_consecutive_limits() {
        let mut b = backoff();
        for _ in 0..4 {
            assert!(b.on_rate_limited(None).cooldown.is_none());
        }
        let fifth = b.on_rate_limited(None);
        assert_eq!(fifth.cooldown, Some(Duration::from_secs(60)));
        assert_eq!(fifth.delay, Duration::from_secs(1));
        assert_eq!(b.consecutive(), 0);
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut b = backoff();
        b.on_rate_limited(None);
        b.on_rate_limited(None);
        b.reset();
        assert_eq!(b.on_rate_limited(None).delay, Duration::from_secs(1));
    }
}
