use std::time::Duration;

use tracing::trace;

/// Fixed delay between consecutive outbound requests.
///
/// No bucket, no burst: the first call passes straight through and every
/// later call sleeps the full interval. One limiter per run, used from a
/// single sequential loop.
pub struct RateLimiter {
    interval: Duration,
    primed: bool,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            primed: false,
        }
    }

    /// Gate the next request.
    pub async fn wait(&mut self) {
        if !self.primed {
            self.primed = true;
            return;
        }
        if self.interval.is_zero() {
            return;
        }
        trace!(delay_ms = self.interval.as_millis() as u64, "Throttling next request");
        tokio::time::sleep(self.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn first_request_is_not_delayed() {
        let mut limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn subsequent_requests_wait_the_full_interval() {
        let mut limiter = RateLimiter::new(Duration::from_millis(150));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_sleeps() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
