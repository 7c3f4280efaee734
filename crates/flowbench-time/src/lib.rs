mod timestamp;

pub use timestamp::Timestamp;

/// Plain wall-clock duration. Re-exported so callers don't need to reach
/// into `std::time` themselves when working with [`Timestamp`] deltas.
pub type Duration = std::time::Duration;
