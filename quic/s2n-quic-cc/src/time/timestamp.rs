// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, num::NonZeroU64, time::Duration};

/// An absolute point in time, measured in microseconds since an arbitrary
/// clock epoch.
///
/// The inner value is non-zero so `Option<Timestamp>` occupies the same space
/// as a `Timestamp`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NonZeroU64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let duration = self.as_duration();
        let micros = duration.subsec_micros();
        let secs = duration.as_secs() % 60;
        let mins = duration.as_secs() / 60 % 60;
        let hours = duration.as_secs() / 60 / 60;
        write!(f, "Timestamp({hours}:{mins:02}:{secs:02}.{micros:06})")
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Timestamp {
    /// Creates a `Timestamp` from a `Duration` since the clock epoch
    ///
    /// Durations shorter than one microsecond are rounded up to the first
    /// representable instant.
    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Self(NonZeroU64::new(micros).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the `Duration` which elapsed since the clock epoch
    #[inline]
    pub const fn as_duration(self) -> Duration {
        Duration::from_micros(self.0.get())
    }

    /// Returns true if this `Timestamp` is at or before `current_time`
    #[inline]
    pub fn has_elapsed(self, current_time: Timestamp) -> bool {
        self <= current_time
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or zero if
    /// `earlier` is after `self`.
    ///
    /// Samples delivered out of order are therefore treated as if they
    /// happened at the same instant.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.get().saturating_sub(earlier.0.get()))
    }

    /// Returns the `Timestamp` `duration` before `self`, or `None` if it would
    /// precede the clock epoch.
    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        let micros = u64::try_from(duration.as_micros()).ok()?;
        NonZeroU64::new(self.0.get().checked_sub(micros)?).map(Self)
    }
}

impl core::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, duration: Duration) -> Self::Output {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl core::ops::AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, duration: Duration) {
        *self = *self + duration;
    }
}

impl core::ops::Sub for Timestamp {
    type Output = Duration;

    /// Saturates to zero when `rhs` is later than `self`
    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}
