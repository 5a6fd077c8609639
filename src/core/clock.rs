use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Time source for TTL and admission-window bookkeeping.
///
/// Production code uses [`SystemClock`]; tests either run on a paused tokio
/// runtime (which `SystemClock` follows) or drive a [`ManualClock`] by hand.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Wait until `duration` has passed on this clock.
    async fn sleep(&self, duration: Duration);
}

/// Reads the tokio clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    /// Moves the clock forward by `duration` instead of waiting.
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(4));
        assert_eq!(clock.now() - start, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_instead_of_waiting() {
        let clock = ManualClock::new();
        let start = clock.now();

        tokio::time::timeout(Duration::from_secs(1), clock.sleep(Duration::from_secs(3600)))
            .await
            .expect("manual sleep should not block");
        assert_eq!(clock.now() - start, Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_follows_paused_runtime() {
        let clock = SystemClock;
        let start = clock.now();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(clock.now() - start >= Duration::from_secs(10));
    }
}
