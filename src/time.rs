/// Virtual time for the simulation kernel.
///
/// Represents a point on the simulation's logical clock with no
/// dependency on `std::time`. Time advances only when the scheduler
/// processes events, never from wall-clock observation.

use std::cmp::Ordering;
use std::ops::Add;

/// A point in simulation time.
///
/// Wraps an `f64` so fractional delays (service times, inter-arrival
/// times) work out of the box. `NaN` is rejected at construction, which
/// makes the `total_cmp`-based total order below well behaved.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(f64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0.0);

    /// Create a new `VirtualTime` from a raw value.
    ///
    /// # Panics
    /// Panics if `value` is NaN.
    #[inline]
    pub fn new(value: f64) -> Self {
        assert!(!value.is_nan(), "virtual time must not be NaN");
        VirtualTime(value)
    }

    /// Return the raw value.
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Compute the time that is `delay` after `self`.
    /// Reads better than `+` at call-sites that schedule future events.
    #[inline]
    pub fn plus(self, delay: f64) -> VirtualTime {
        self + delay
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self < other
    }

    /// Returns the elapsed time between two points.
    /// Returns `None` if `other` is after `self`.
    #[inline]
    pub fn duration_since(self, other: VirtualTime) -> Option<f64> {
        if self >= other {
            Some(self.0 - other.0)
        } else {
            None
        }
    }
}

impl Add<f64> for VirtualTime {
    type Output = VirtualTime;

    fn add(self, delay: f64) -> VirtualTime {
        VirtualTime::new(self.0 + delay)
    }
}

impl From<f64> for VirtualTime {
    fn from(value: f64) -> Self {
        VirtualTime::new(value)
    }
}

impl PartialEq for VirtualTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for VirtualTime {}

/// Total order via `f64::total_cmp`; NaN is excluded at construction.
impl Ord for VirtualTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for VirtualTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(VirtualTime::ZERO.value(), 0.0);
    }

    #[test]
    fn test_ordering() {
        let t1 = VirtualTime::new(1.5);
        let t2 = VirtualTime::new(2.0);
        assert!(t1 < t2);
        assert!(t1.is_before(t2));
        assert!(!t2.is_before(t1));
    }

    #[test]
    fn test_add_delay() {
        let t = VirtualTime::new(10.0);
        assert_eq!(t + 2.5, VirtualTime::new(12.5));
        assert_eq!(t.plus(0.0), t);
    }

    #[test]
    fn test_duration_since() {
        let t1 = VirtualTime::new(10.0);
        let t2 = VirtualTime::new(30.0);
        assert_eq!(t2.duration_since(t1), Some(20.0));
        assert_eq!(t1.duration_since(t2), None);
    }

    #[test]
    #[should_panic(expected = "NaN")]
    fn test_nan_rejected() {
        VirtualTime::new(f64::NAN);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", VirtualTime::new(2.5)), "T=2.5");
        assert_eq!(format!("{}", VirtualTime::ZERO), "T=0");
    }

    #[test]
    fn test_equality() {
        assert_eq!(VirtualTime::new(99.0), VirtualTime::new(99.0));
        assert_ne!(VirtualTime::new(-0.5), VirtualTime::new(0.5));
    }
}
