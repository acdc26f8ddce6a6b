//! Monotonic time for the node's timing policy.
//!
//! Every wait that shapes the node's behaviour (bring-up windows, the loop
//! period, keep-alive and acknowledgement timeouts) goes through [`Clock`],
//! so it can be driven by a fake clock in tests. Sensor conversion delays are
//! hardware timing and use `embedded_hal_async::delay::DelayNs` instead.

use embassy_time::{Duration, Instant, Timer};

/// Source of monotonic time and sleeps.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// Clock backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        Timer::after(duration).await
    }
}

/// A point in time after which a bounded wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after<C: Clock>(clock: &C, timeout: Duration) -> Self {
        Self {
            at: clock.now() + timeout,
        }
    }

    pub fn has_expired<C: Clock>(&self, clock: &C) -> bool {
        clock.now() >= self.at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining<C: Clock>(&self, clock: &C) -> Duration {
        self.at
            .checked_duration_since(clock.now())
            .unwrap_or(Duration::from_ticks(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClock;
    use embassy_futures::block_on;

    #[test]
    fn deadline_expires_on_fake_time() {
        let clock = FakeClock::new();
        let deadline = Deadline::after(&clock, Duration::from_millis(1500));

        assert!(!deadline.has_expired(&clock));
        block_on(clock.sleep(Duration::from_millis(1000)));
        assert_eq!(deadline.remaining(&clock), Duration::from_millis(500));

        block_on(clock.sleep(Duration::from_millis(500)));
        assert!(deadline.has_expired(&clock));
        assert_eq!(deadline.remaining(&clock), Duration::from_ticks(0));
    }
}
