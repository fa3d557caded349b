// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    recovery::windowed_filter::{WindowedMaxFilter, WindowedMinFilter},
    time::Timestamp,
};
use core::{fmt, time::Duration};

/// A data rate, in bits per second
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bandwidth {
    bits_per_second: u64,
}

impl Bandwidth {
    pub const ZERO: Bandwidth = Bandwidth { bits_per_second: 0 };

    pub const INFINITY: Bandwidth = Bandwidth {
        bits_per_second: u64::MAX,
    };

    /// Constructs the rate at which `bytes` were delivered over `interval`
    pub fn new(bytes: u64, interval: Duration) -> Self {
        const MICRO_BITS_PER_BYTE: u128 = 8 * 1_000_000;

        if interval.is_zero() {
            return Bandwidth::ZERO;
        }

        let bits_per_second = bytes as u128 * MICRO_BITS_PER_BYTE / interval.as_micros().max(1);
        Self {
            bits_per_second: u64::try_from(bits_per_second).unwrap_or(u64::MAX),
        }
    }

    #[inline]
    pub const fn from_bits_per_second(bits_per_second: u64) -> Self {
        Self { bits_per_second }
    }

    #[inline]
    pub const fn as_bits_per_second(self) -> u64 {
        self.bits_per_second
    }

    #[inline]
    pub const fn as_bytes_per_second(self) -> u64 {
        self.bits_per_second / 8
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.bits_per_second == 0
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}bps", self.bits_per_second)
    }
}

/// The number of bytes delivered at the given rate over the given interval
impl core::ops::Mul<Duration> for Bandwidth {
    type Output = u64;

    fn mul(self, rhs: Duration) -> Self::Output {
        const MICRO_BITS_PER_BYTE: u128 = 8 * 1_000_000;

        let bytes = self.bits_per_second as u128 * rhs.as_micros() / MICRO_BITS_PER_BYTE;
        u64::try_from(bytes).unwrap_or(u64::MAX)
    }
}

/// A single delivery rate measurement taken when processing an acknowledgement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    /// The delivery rate, zero if no valid rate is available
    bandwidth: Bandwidth,
    /// The RTT measured alongside the rate, zero if not available. Not
    /// corrected for ack delay.
    rtt: Duration,
    /// Whether the sender lacked the data to saturate the path, in which case
    /// `bandwidth` may underestimate the path capacity
    is_app_limited: bool,
}

impl Sample {
    #[inline]
    pub const fn new(bandwidth: Bandwidth, rtt: Duration, is_app_limited: bool) -> Self {
        Self {
            bandwidth,
            rtt,
            is_app_limited,
        }
    }

    #[inline]
    pub const fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    #[inline]
    pub const fn rtt(&self) -> Duration {
        self.rtt
    }

    #[inline]
    pub const fn is_app_limited(&self) -> bool {
        self.is_app_limited
    }
}

/// Windowed maximum bandwidth and minimum RTT derived from a stream of
/// [`Sample`]s
#[derive(Clone, Debug)]
pub struct Filter {
    max_bandwidth: WindowedMaxFilter<Bandwidth>,
    min_rtt: WindowedMinFilter<Duration>,
}

impl Filter {
    pub fn new(bandwidth_window: Duration, min_rtt_window: Duration) -> Self {
        Self {
            max_bandwidth: WindowedMaxFilter::new(bandwidth_window),
            min_rtt: WindowedMinFilter::new(min_rtt_window),
        }
    }

    /// Applies a sample taken at `now`
    ///
    /// Application limited samples underestimate the path capacity, so they
    /// only count towards the maximum when they are at least as large as the
    /// maximum still inside the window.
    pub fn on_sample(&mut self, sample: Sample, now: Timestamp) {
        let exceeds_max = || {
            self.max_bandwidth
                .best_in_window(now)
                .map_or(true, |max| sample.bandwidth >= max)
        };

        if !sample.bandwidth.is_zero() && (!sample.is_app_limited || exceeds_max()) {
            self.max_bandwidth.update(sample.bandwidth, now);
        }

        if !sample.rtt.is_zero() {
            self.min_rtt.update(sample.rtt, now);
        }
    }

    /// The maximum bandwidth in the window, if any sample was recorded
    #[inline]
    pub fn max_bandwidth(&self) -> Option<Bandwidth> {
        (!self.max_bandwidth.is_empty()).then(|| self.max_bandwidth.best())
    }

    /// The minimum RTT in the window, if any sample was recorded
    #[inline]
    pub fn min_rtt(&self) -> Option<Duration> {
        (!self.min_rtt.is_empty()).then(|| self.min_rtt.best())
    }

    /// The bandwidth delay product, in bytes, if both estimates are available
    #[inline]
    pub fn bdp(&self) -> Option<u64> {
        Some(self.max_bandwidth()? * self.min_rtt()?)
    }

    /// Discards all estimates, for example after the path changed
    pub fn reset(&mut self) {
        self.max_bandwidth.reset();
        self.min_rtt.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn bandwidth() {
        assert_eq!(Bandwidth::new(1000, Duration::ZERO), Bandwidth::ZERO);
        assert_eq!(
            Bandwidth::new(1000, ms(100)),
            Bandwidth::from_bits_per_second(80_000)
        );
        assert_eq!(Bandwidth::new(1000, ms(100)).as_bytes_per_second(), 10_000);
        assert_eq!(
            Bandwidth::new(u64::MAX, Duration::from_micros(1)),
            Bandwidth::INFINITY
        );

        assert_eq!(Bandwidth::from_bits_per_second(80_000) * ms(100), 1000);
        assert_eq!(Bandwidth::ZERO * ms(100), 0);
        assert!(Bandwidth::new(2000, ms(100)) > Bandwidth::new(1000, ms(100)));
        assert_eq!(Bandwidth::from_bits_per_second(12).to_string(), "12bps");
    }

    #[test]
    fn sample() {
        let bandwidth = Bandwidth::new(1200, ms(10));
        let sample = Sample::new(bandwidth, ms(30), true);

        assert_eq!(sample.bandwidth(), bandwidth);
        assert_eq!(sample.rtt(), ms(30));
        assert!(sample.is_app_limited());
        assert_eq!(Sample::default().bandwidth(), Bandwidth::ZERO);
    }

    #[test]
    fn filter() {
        let mut filter = Filter::new(ms(100), Duration::from_secs(10));
        let now = NoopClock.get_time();

        assert_eq!(filter.max_bandwidth(), None);
        assert_eq!(filter.min_rtt(), None);
        assert_eq!(filter.bdp(), None);

        let high = Bandwidth::from_bits_per_second(8_000_000);
        filter.on_sample(Sample::new(high, ms(50), false), now);
        assert_eq!(filter.max_bandwidth(), Some(high));
        assert_eq!(filter.min_rtt(), Some(ms(50)));
        assert_eq!(filter.bdp(), Some(50_000));

        let low = Bandwidth::from_bits_per_second(4_000_000);
        filter.on_sample(Sample::new(low, ms(40), false), now + ms(10));
        assert_eq!(filter.max_bandwidth(), Some(high));
        assert_eq!(filter.min_rtt(), Some(ms(40)));

        filter.reset();
        assert_eq!(filter.max_bandwidth(), None);
        assert_eq!(filter.min_rtt(), None);
    }

    #[test]
    fn app_limited_samples() {
        let mut filter = Filter::new(ms(100), Duration::from_secs(10));
        let now = NoopClock.get_time();
        let low = Bandwidth::from_bits_per_second(1_000);
        let high = Bandwidth::from_bits_per_second(2_000);

        // with nothing better in the window, an app limited sample is used
        filter.on_sample(Sample::new(low, Duration::ZERO, true), now);
        assert_eq!(filter.max_bandwidth(), Some(low));

        filter.on_sample(Sample::new(high, Duration::ZERO, false), now + ms(1));
        assert_eq!(filter.max_bandwidth(), Some(high));

        // a lower app limited sample is ignored entirely, so it can't become a
        // second best estimate
        filter.on_sample(Sample::new(low, Duration::ZERO, true), now + ms(50));
        let estimates = filter.max_bandwidth.estimates().unwrap();
        assert!(estimates.iter().all(|estimate| estimate.value == high));

        // a higher app limited sample is a new maximum
        let higher = Bandwidth::from_bits_per_second(3_000);
        filter.on_sample(Sample::new(higher, Duration::ZERO, true), now + ms(60));
        assert_eq!(filter.max_bandwidth(), Some(higher));

        // zero RTTs are not measurements
        assert_eq!(filter.min_rtt(), None);
    }

    #[test]
    fn app_limited_samples_replace_an_expired_maximum() {
        let mut filter = Filter::new(ms(100), Duration::from_secs(10));
        let now = NoopClock.get_time();
        let high = Bandwidth::from_bits_per_second(8_000_000);
        let low = Bandwidth::from_bits_per_second(1_000_000);

        filter.on_sample(Sample::new(high, ms(20), false), now);

        // still in the window, so the lower app limited sample is ignored
        filter.on_sample(Sample::new(low, ms(20), true), now + ms(100));
        assert_eq!(filter.max_bandwidth(), Some(high));

        // the application only sent a little for a long time
        for offset in 501..=510 {
            filter.on_sample(Sample::new(low, ms(20), true), now + ms(offset));
        }
        assert_eq!(filter.max_bandwidth(), Some(low));
    }
}
