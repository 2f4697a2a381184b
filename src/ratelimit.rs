//! Shared minimum-interval gate for every request to the catalog service.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock as _, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::debug;

/// Shortest sleep between two permit checks.
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// Grants at most one permit per `min_interval`, across all callers and threads.
///
/// Created once at the composition root and passed by reference to every
/// request site, so the interval is global rather than per query.
pub struct RateGate {
    /// Clock used to turn a rejection into a wait duration.
    clock: DefaultClock,
    /// Configured spacing; caps a single sleep.
    interval: Duration,
    /// `None` when the interval is zero.
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RateGate {
    /// Build a gate enforcing `min_interval` between permits. A zero interval disables it.
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| return RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        return Self {
            clock: DefaultClock::default(),
            interval: min_interval,
            limiter,
        };
    }

    /// Block the calling thread until the next permit is available.
    pub fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        loop {
            match limiter.check() {
                Ok(()) => return,
                Err(not_until) => {
                    let wait = not_until
                        .wait_time_from(self.clock.now())
                        .clamp(MIN_SLEEP, self.interval.max(MIN_SLEEP));
                    debug!(?wait, "rate gate closed");
                    std::thread::sleep(wait);
                },
            }
        }
    }
}
