//! Time source abstraction
//!
//! Stage durations, recovery delays, timeouts and event timestamps all go
//! through a [`Clock`], so tests can drive the engine deterministically.
//! Both implementations suspend on tokio timers, which means a runtime with
//! paused time (`#[tokio::test(start_paused = true)]`) runs a whole pipeline
//! instantly and in a reproducible order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Source of wall-clock time and timer-based suspension
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the calling task for `duration`
    ///
    /// This is the engine's only suspension point; it must yield, never
    /// busy-wait.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
///
/// Wall time is anchored at construction and advanced by the tokio
/// monotonic clock, so timestamps stay consistent with timer durations
/// even when tokio time is paused.
pub struct TokioClock {
    origin_wall: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin_wall: Utc::now(),
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.origin);
        self.origin_wall + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock with a fixed starting instant that only moves when sleeps complete
///
/// A cancelled sleep (for example the losing side of a timeout race) does
/// not advance the clock, so recorded durations are exact.
pub struct VirtualClock {
    now: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    /// Creates a clock frozen at `start`
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward without suspending
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_millis(1500)).await;

        let elapsed = clock.now() - before;
        assert_eq!(elapsed.num_milliseconds(), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_advances_on_completed_sleep() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = VirtualClock::starting_at(start);

        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!((clock.now() - start).num_milliseconds(), 250);

        clock.advance(Duration::from_secs(1));
        assert_eq!((clock.now() - start).num_milliseconds(), 1250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_ignores_cancelled_sleep() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = VirtualClock::starting_at(start);

        tokio::select! {
            _ = clock.sleep(Duration::from_millis(100)) => {}
            _ = clock.sleep(Duration::from_millis(900)) => {}
        }

        assert_eq!((clock.now() - start).num_milliseconds(), 100);
    }
}
