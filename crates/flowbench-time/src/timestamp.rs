use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock instant, stored as nanoseconds since the Unix epoch.
///
/// Blocks are stamped at nanosecond resolution rather than the coarser
/// microsecond `timeval` a wire format like this might otherwise use, since
/// a `u64` nanosecond count is exactly as cheap to carry around and avoids
/// a second unit in the wire format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[must_use]
    pub fn now() -> Self {
        let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Timestamp(d.as_nanos() as u64)
    }

    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// `self - earlier`, saturating at zero if `earlier` is actually later.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Signed delta `self - earlier` in seconds, negative if `self` precedes `earlier`.
    #[must_use]
    pub fn signed_diff_secs(self, earlier: Timestamp) -> f64 {
        self.0 as f64 / 1e9 - earlier.0 as f64 / 1e9
    }

    #[must_use]
    pub fn checked_add(self, d: Duration) -> Option<Timestamp> {
        self.0.checked_add(d.as_nanos() as u64).map(Timestamp)
    }

    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(d.as_nanos() as u64))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Duration) -> Timestamp {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub<Timestamp> for Timestamp {
    type Output = Duration;
    fn sub(self, rhs: Timestamp) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_sub_round_trips() {
        let t0 = Timestamp::from_nanos(1_000_000_000);
        let t1 = t0 + Duration::from_millis(500);
        assert_eq!(t1.as_nanos(), 1_500_000_000);
        assert_eq!(t1 - t0, Duration::from_millis(500));
    }

    #[test]
    fn signed_diff_is_negative_when_reversed() {
        let t0 = Timestamp::from_nanos(2_000_000_000);
        let t1 = Timestamp::from_nanos(1_000_000_000);
        assert!(t1.signed_diff_secs(t0) < 0.0);
    }

    #[test]
    fn now_is_monotonic_enough_for_ordering() {
        let a = Timestamp::now();
        std::thread::sleep(Duration::from_millis(1));
        let b = Timestamp::now();
        assert!(b >= a);
    }
}
