// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic timestamps and durations for frame pacing.
//!
//! [`HostTime`] is a point on the host's monotonic clock, in ticks. Hosts that
//! read `mach_absolute_time` or `QueryPerformanceCounter` keep the raw ticks
//! and describe them with a [`Timebase`]; hosts that already count nanoseconds
//! use [`Timebase::NANOS`].
//!
//! [`Duration`] is a span in the same tick units. The output-surface scheduler
//! only ever compares and offsets these values; it never converts them.

use core::fmt;
use core::ops::{Add, Sub};

/// A point in time expressed as monotonic host ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Returns the span from `earlier` to `self`, or zero if `earlier` is
    /// later.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Returns the absolute distance between two timestamps.
    #[inline]
    #[must_use]
    pub const fn abs_diff(self, other: Self) -> Duration {
        Duration(self.0.abs_diff(other.0))
    }

    /// Adds a duration, saturating at the end of the clock.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(d.0))
    }

    /// Returns the first instant of the grid `phase + k * interval` that is at
    /// or after `self`.
    ///
    /// Returns `self` unchanged when `interval` is zero.
    #[must_use]
    pub const fn next_on_grid(self, phase: Self, interval: Duration) -> Self {
        if interval.0 == 0 {
            return self;
        }
        if self.0 <= phase.0 {
            let behind = (phase.0 - self.0) / interval.0;
            return Self(phase.0 - behind * interval.0);
        }
        let since = self.0 - phase.0;
        let rem = since % interval.0;
        if rem == 0 {
            self
        } else {
            Self(self.0.saturating_add(interval.0 - rem))
        }
    }

    /// Returns the last instant of the grid `phase + k * interval` that is at
    /// or before `self`, if any.
    #[must_use]
    pub const fn prev_on_grid(self, phase: Self, interval: Duration) -> Option<Self> {
        if interval.0 == 0 || self.0 < phase.0 {
            return None;
        }
        let since = self.0 - phase.0;
        Some(Self(self.0 - since % interval.0))
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// A span of host ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Duration(pub u64);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Returns `true` for a zero-length span.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Divides the span by `n`, rounding down. Dividing by zero yields zero.
    #[inline]
    #[must_use]
    pub const fn div(self, n: u64) -> Self {
        match self.0.checked_div(n) {
            Some(v) => Self(v),
            None => Self::ZERO,
        }
    }
}

impl Add for Duration {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({})", self.0)
    }
}

/// Rational ticks-to-nanoseconds factor: `nanos = ticks * numer / denom`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator of the ticks-to-nanoseconds ratio.
    pub numer: u32,
    /// Denominator of the ticks-to-nanoseconds ratio.
    pub denom: u32,
}

impl Timebase {
    /// Ticks are nanoseconds.
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// Creates a timebase.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    #[inline]
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "timebase denominator must not be zero");
        Self { numer, denom }
    }

    /// Converts a tick count to nanoseconds through a `u128` intermediate.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn ticks_to_nanos(self, ticks: u64) -> u64 {
        (ticks as u128 * self.numer as u128 / self.denom as u128) as u64
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_on_grid_aligns_forward() {
        let phase = HostTime(10);
        let interval = Duration(100);
        assert_eq!(HostTime(10).next_on_grid(phase, interval), HostTime(10));
        assert_eq!(HostTime(11).next_on_grid(phase, interval), HostTime(110));
        assert_eq!(HostTime(110).next_on_grid(phase, interval), HostTime(110));
        // Before the phase, the earliest grid point at or after `self` wins.
        assert_eq!(HostTime(0).next_on_grid(HostTime(250), interval), HostTime(50));
    }

    #[test]
    fn prev_on_grid_aligns_backward() {
        let phase = HostTime(10);
        let interval = Duration(100);
        assert_eq!(HostTime(5).prev_on_grid(phase, interval), None);
        assert_eq!(HostTime(10).prev_on_grid(phase, interval), Some(HostTime(10)));
        assert_eq!(HostTime(209).prev_on_grid(phase, interval), Some(HostTime(110)));
    }

    #[test]
    fn zero_interval_is_inert() {
        assert_eq!(
            HostTime(7).next_on_grid(HostTime(0), Duration::ZERO),
            HostTime(7)
        );
        assert_eq!(HostTime(7).prev_on_grid(HostTime(0), Duration::ZERO), None);
    }

    #[test]
    fn duration_helpers() {
        assert_eq!(Duration(16).div(2), Duration(8));
        assert_eq!(Duration(16).div(0), Duration::ZERO);
        assert!(Duration::ZERO.is_zero());
        assert_eq!(HostTime(5).abs_diff(HostTime(9)), Duration(4));
        assert_eq!(HostTime(u64::MAX).saturating_add(Duration(1)), HostTime(u64::MAX));
    }

    #[test]
    fn timebase_converts_arm_mac_ticks() {
        let tb = Timebase::new(125, 3);
        assert_eq!(tb.ticks_to_nanos(24_000_000), 1_000_000_000, "24 MHz → 1s");
        assert_eq!(Timebase::NANOS.ticks_to_nanos(42), 42);
    }
}
