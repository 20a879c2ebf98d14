//! Rate divider: turns an aggregate packets-per-second target into a
//! per-worker send interval.
//!
//! The tokio timer has millisecond granularity, so intervals are clamped to
//! [`TIMER_RESOLUTION`].  A per-worker rate above 1000 pps therefore runs at
//! one send per millisecond per worker; this is a known limitation, not an
//! error.  Use unlimited mode (`rate = 0`) to go faster.

use std::time::Duration;

/// Shortest interval the timer can honour.
pub const TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Longest interval we schedule.  Anything slower is effectively idle.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How a packet worker spaces its sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Send as fast as the socket accepts datagrams.
    Unlimited,
    /// One send per tick.
    Every(Duration),
}

impl Pacing {
    pub fn new(global_rate: f64, workers: usize) -> Self {
        match per_worker_interval(global_rate, workers) {
            Some(interval) => Self::Every(interval),
            None => Self::Unlimited,
        }
    }
}

/// Interval between sends for each of `workers` workers sharing
/// `global_rate` packets per second, i.e. `workers / global_rate` seconds.
///
/// Returns `None` for `global_rate == 0` (unlimited).  Callers validate
/// the rate first; negative or non-finite rates are also treated as unlimited.
pub fn per_worker_interval(global_rate: f64, workers: usize) -> Option<Duration> {
    if !global_rate.is_finite() || global_rate <= 0.0 {
        return None;
    }

    let secs = workers.max(1) as f64 / global_rate;
    let interval = Duration::try_from_secs_f64(secs).unwrap_or(MAX_INTERVAL);
    Some(interval.clamp(TIMER_RESOLUTION, MAX_INTERVAL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divides_rate_across_workers() {
        assert_eq!(
            per_worker_interval(10.0, 5),
            Some(Duration::from_millis(500))
        );
        assert_eq!(per_worker_interval(10.0, 1), Some(Duration::from_millis(100)));
        assert_eq!(per_worker_interval(1.0, 1), Some(Duration::from_secs(1)));
        assert_eq!(per_worker_interval(4.0, 8), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_zero_rate_is_unlimited() {
        assert_eq!(per_worker_interval(0.0, 5), None);
        assert_eq!(Pacing::new(0.0, 3), Pacing::Unlimited);
    }

    #[test]
    fn test_fractional_rate() {
        // 0.5 pps on one worker: one packet every two seconds.
        assert_eq!(per_worker_interval(0.5, 1), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_sub_resolution_rate_clamps_to_timer_resolution() {
        assert_eq!(per_worker_interval(1_000_000.0, 1), Some(TIMER_RESOLUTION));
        assert_eq!(per_worker_interval(f64::MAX, 1), Some(TIMER_RESOLUTION));
    }

    #[test]
    fn test_tiny_rate_clamps_to_max_interval() {
        assert_eq!(per_worker_interval(1e-300, 10), Some(MAX_INTERVAL));
    }

    #[test]
    fn test_invalid_rates_do_not_panic() {
        assert_eq!(per_worker_interval(-5.0, 2), None);
        assert_eq!(per_worker_interval(f64::NAN, 2), None);
        assert_eq!(Pacing::new(100.0, 0), Pacing::Every(Duration::from_millis(10)));
    }
}
