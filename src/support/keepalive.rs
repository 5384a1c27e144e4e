//! WebSocket keepalive timer
//!
//! Both roles ping their peer on a configured interval; an interval of 0
//! disables the timer. The first tick fires one full period after the
//! connection is set up, not immediately.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval};

/// Build the keepalive timer for a PING interval in seconds.
pub fn keepalive(interval_secs: u64) -> Option<Interval> {
    (interval_secs > 0).then(|| {
        let period = Duration::from_secs(interval_secs);
        interval_at(Instant::now() + period, period)
    })
}

/// Wait for the next keepalive tick; pends forever when disabled, so it
/// can sit in a `select!` without a guard.
pub async fn next_ping(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_after_one_full_period() {
        let mut ping = keepalive(60);
        let started = Instant::now();
        next_ping(&mut ping).await;
        assert!(started.elapsed() >= Duration::from_secs(60));
        // Subsequent ticks keep the cadence.
        next_ping(&mut ping).await;
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_fires() {
        let mut ping = keepalive(0);
        assert!(ping.is_none());
        let fired =
            tokio::time::timeout(Duration::from_secs(3600), next_ping(&mut ping)).await;
        assert!(fired.is_err());
    }
}
