use crate::core::clock::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Sliding-window admission control.
///
/// Keeps the admission timestamps of the trailing window. After `acquire`
/// returns, the window never holds more than `max_requests` timestamps.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    admitted: Mutex<VecDeque<Instant>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub requests_made: usize,
    pub max_requests: usize,
    pub window: Duration,
    pub remaining: usize,
    /// Time until the oldest admission leaves the window; zero when empty.
    pub resets_in: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            clock,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Wait until one more request fits in the window, then record it.
    #[instrument(skip(self), fields(max_requests = self.max_requests))]
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut admitted = self.admitted.lock();
                let now = self.clock.now();
                self.evict(&mut admitted, now);

                if admitted.len() < self.max_requests {
                    admitted.push_back(now);
                    return;
                }

                // Full: sleep until the oldest admission ages out, then re-check
                admitted
                    .front()
                    .map_or(Duration::ZERO, |oldest| {
                        (*oldest + self.window).saturating_duration_since(now)
                    })
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            self.clock.sleep(wait).await;
        }
    }

    pub fn status(&self) -> RateLimitStatus {
        let mut admitted = self.admitted.lock();
        let now = self.clock.now();
        self.evict(&mut admitted, now);

        let requests_made = admitted.len();
        RateLimitStatus {
            requests_made,
            max_requests: self.max_requests,
            window: self.window,
            remaining: self.max_requests.saturating_sub(requests_made),
            resets_in: admitted.front().map_or(Duration::ZERO, |oldest| {
                (*oldest + self.window).saturating_duration_since(now)
            }),
        }
    }

    fn evict(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("in_window", &self.admitted.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{ManualClock, SystemClock};

    fn limiter(max: usize, window: Duration) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(max, window, Arc::new(SystemClock)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_acquire_waits_for_window() {
        let limiter = limiter(2, Duration::from_secs(1));

        limiter.acquire().await;
        let first = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        let third = Instant::now();

        assert!(third - first >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_quota() {
        let window = Duration::from_millis(500);
        let limiter = limiter(3, window);
        let mut admitted = Vec::new();

        for i in 0..20u64 {
            limiter.acquire().await;
            admitted.push(Instant::now());
            // Irregular gaps between callers
            tokio::time::sleep(Duration::from_millis((i * 37) % 120)).await;
        }

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .filter(|t| t.duration_since(*start) < window)
                .count();
            assert!(in_window <= 3, "window starting at {} held {}", i, in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_quota() {
        let window = Duration::from_secs(1);
        let limiter = limiter(4, window);
        let start = Instant::now();

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for task in tasks {
            times.push(task.await.unwrap());
        }
        times.sort();

        for (i, t) in times.iter().enumerate() {
            let in_window = times[i..]
                .iter()
                .filter(|other| other.duration_since(*t) < window)
                .count();
            assert!(in_window <= 4);
        }
        assert!(times[11] - start >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_manual_clock_drives_the_wait() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(1, Duration::from_secs(1), clock.clone());
        let start = clock.now();

        limiter.acquire().await;
        tokio::time::timeout(Duration::from_secs(5), limiter.acquire())
            .await
            .expect("acquire should advance the manual clock");

        assert_eq!(clock.now() - start, Duration::from_secs(1));
        assert_eq!(limiter.status().requests_made, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_remaining() {
        let limiter = limiter(5, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;

        let status = limiter.status();
        assert_eq!(status.requests_made, 2);
        assert_eq!(status.remaining, 3);
        assert_eq!(status.resets_in, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let status = limiter.status();
        assert_eq!(status.requests_made, 0);
        assert_eq!(status.remaining, 5);
    }
}
