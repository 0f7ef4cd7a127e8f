//! Fixed-period liveness probe schedule.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Ticks once per period, starting one full period after creation.
///
/// The schedule ignores data activity. Dropping it stops the timer.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
}

impl Heartbeat {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Completes at the next scheduled probe. Cancel safe.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
