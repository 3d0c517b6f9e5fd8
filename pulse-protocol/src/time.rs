//! Minimal time handling: a microsecond duration wrapper used throughout the timing model.
//!
//! A full monotonic-clock/timeval conversion layer is out of scope here; the mainloop
//! implementation (`pulse-tokio`) and `std::time` cover that. This module only carries the wire
//! and arithmetic representation the protocol itself needs.

use std::time::Duration;

/// Sentinel carried on the wire to mean "no value" / "invalid".
pub const USEC_INVALID: u64 = u64::MAX;

/// A duration in microseconds, as carried by the `U` tag-struct type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct MicroSeconds(pub u64);

impl MicroSeconds {
    /// The wire sentinel meaning "invalid"/"unknown".
    pub const INVALID: MicroSeconds = MicroSeconds(USEC_INVALID);

    pub fn is_valid(self) -> bool {
        self.0 != USEC_INVALID
    }

    pub fn saturating_add(self, other: MicroSeconds) -> MicroSeconds {
        MicroSeconds(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: MicroSeconds) -> MicroSeconds {
        MicroSeconds(self.0.saturating_sub(other.0))
    }
}

impl From<Duration> for MicroSeconds {
    fn from(d: Duration) -> Self {
        MicroSeconds(d.as_micros() as u64)
    }
}

impl From<MicroSeconds> for Duration {
    fn from(u: MicroSeconds) -> Self {
        Duration::from_micros(u.0)
    }
}

impl std::ops::Add for MicroSeconds {
    type Output = MicroSeconds;
    fn add(self, rhs: Self) -> Self {
        MicroSeconds(self.0 + rhs.0)
    }
}

impl std::ops::Sub for MicroSeconds {
    type Output = MicroSeconds;
    fn sub(self, rhs: Self) -> Self {
        MicroSeconds(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinel_detected() {
        assert!(!MicroSeconds::INVALID.is_valid());
        assert!(MicroSeconds(0).is_valid());
    }

    #[test]
    fn duration_round_trip() {
        let d = Duration::from_micros(12345);
        let u: MicroSeconds = d.into();
        assert_eq!(u.0, 12345);
    }
}
