//! Token bucket used to cap fan-out passes per second.

use tokio::time::Instant;

/// Continuously refilling token bucket.
///
/// Holds at most `rate` tokens and gains `elapsed_secs * rate` tokens
/// between acquisitions. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: u32) -> Self {
        Self::new_at(rate, Instant::now())
    }

    pub fn new_at(rate: u32, now: Instant) -> Self {
        let rate = f64::from(rate);
        Self {
            rate,
            tokens: rate,
            last_refill: now,
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after refilling up to `now`.
    pub fn available_at(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.rate);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn burst_is_capped_at_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(5, start);

        let granted = (0..8).filter(|_| bucket.try_acquire_at(start)).count();
        assert_eq!(granted, 5);
    }

    #[test]
    fn refills_continuously() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(10, start);
        for _ in 0..10 {
            assert!(bucket.try_acquire_at(start));
        }
        assert!(!bucket.try_acquire_at(start));

        // 100ms at 10 tokens/s buys exactly one token.
        let later = start + Duration::from_millis(100);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));
    }

    #[test]
    fn idle_time_never_overfills() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(3, start);
        let much_later = start + Duration::from_secs(3600);
        assert_eq!(bucket.available_at(much_later), 3.0);
    }
}
