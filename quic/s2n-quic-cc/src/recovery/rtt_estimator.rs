// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    sync::{AtomicU64, Ordering},
    time::Timestamp,
};
use core::time::Duration;

/// The RTT reported before any sample has been taken
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(100);

/// Sentinel for a duration that could not be measured. Samples equal to it are ignored.
pub const INFINITE_DURATION: Duration = Duration::from_nanos(i64::MAX as u64);

/// Weight of a new sample in the smoothed RTT (alpha = 1/8)
const ALPHA_DENOMINATOR: u64 = 8;
/// Weight of a new deviation in the mean deviation (beta = 1/4)
const BETA_DENOMINATOR: u64 = 4;

/// Round trip time statistics for a single path
///
/// Each statistic is stored in its own atomic so the send path can read the
/// smoothed RTT while the receive path is applying a sample. Reads of two
/// different statistics are not a consistent snapshot: a reader may observe
/// the new `smoothed_rtt` together with the previous `mean_deviation`.
///
/// All updates are expected to come from a single ack processing context.
#[derive(Debug)]
pub struct RttEstimator {
    /// The minimum value observed over the lifetime of the path
    min_rtt: AtomicDuration,
    /// Latest RTT sample, corrected for ack delay when possible
    latest_rtt: AtomicDuration,
    /// An exponentially-weighted moving average; zero until the first sample
    smoothed_rtt: AtomicDuration,
    /// The mean deviation of the samples from `smoothed_rtt`
    mean_deviation: AtomicDuration,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    /// Creates an estimator with no samples
    pub fn new() -> Self {
        Self {
            min_rtt: AtomicDuration::new(),
            latest_rtt: AtomicDuration::new(),
            smoothed_rtt: AtomicDuration::new(),
            mean_deviation: AtomicDuration::new(),
        }
    }

    /// Gets the minimum round trip time, or zero if no sample has been taken
    #[inline]
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt.load()
    }

    /// Gets the latest round trip time sample, or zero if no sample has been taken
    #[inline]
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt.load()
    }

    /// Gets the weighted average round trip time, or zero if no sample has been taken
    #[inline]
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.load()
    }

    /// Gets the mean deviation of the round trip time samples
    #[inline]
    pub fn mean_deviation(&self) -> Duration {
        self.mean_deviation.load()
    }

    /// Gets the smoothed round trip time, falling back to [`DEFAULT_INITIAL_RTT`]
    /// before the first sample
    #[inline]
    pub fn smoothed_or_initial_rtt(&self) -> Duration {
        let smoothed_rtt = self.smoothed_rtt();
        if smoothed_rtt.is_zero() {
            DEFAULT_INITIAL_RTT
        } else {
            smoothed_rtt
        }
    }

    /// Applies a new RTT sample
    ///
    /// `send_delta` is the time between sending the packet and receiving its
    /// acknowledgement, `ack_delay` is the delay the peer reported adding before
    /// acknowledging. Zero or infinite `send_delta`s are ignored.
    pub fn update(&self, send_delta: Duration, ack_delay: Duration, now: Timestamp) {
        if send_delta.is_zero() || send_delta >= INFINITE_DURATION {
            tracing::trace!(?send_delta, ?now, "ignoring invalid rtt sample");
            return;
        }

        // The minimum is taken from the raw send delta. A coarse peer clock can
        // report an inflated ack delay, which would underestimate min_rtt if it
        // were subtracted first.
        let mut min_rtt = self.min_rtt.load();
        if min_rtt.is_zero() || send_delta < min_rtt {
            min_rtt = send_delta;
            self.min_rtt.store(min_rtt);
        }

        // Only correct for the ack delay if the result stays at or above min_rtt
        let mut sample = send_delta;
        if sample - min_rtt >= ack_delay {
            sample -= ack_delay;
        }
        self.latest_rtt.store(sample);

        let smoothed_rtt = self.smoothed_rtt.load();
        if smoothed_rtt.is_zero() {
            self.smoothed_rtt.store(sample);
            self.mean_deviation.store(sample / 2);
            return;
        }

        // The averages are computed with microsecond resolution
        let deviation = as_micros(abs_difference(smoothed_rtt, sample));
        let mean_deviation = as_micros(self.mean_deviation.load());
        let mean_deviation =
            ((BETA_DENOMINATOR - 1) * mean_deviation + deviation) / BETA_DENOMINATOR;
        self.mean_deviation
            .store(Duration::from_micros(mean_deviation));

        let smoothed_rtt =
            ((ALPHA_DENOMINATOR - 1) * as_micros(smoothed_rtt) + as_micros(sample))
                / ALPHA_DENOMINATOR;
        // a smoothed_rtt of zero means "no samples", so sub-microsecond paths are rounded up
        let smoothed_rtt = Duration::from_micros(smoothed_rtt).max(Duration::from_nanos(1));
        self.smoothed_rtt.store(smoothed_rtt);
    }

    /// Discards all samples after the connection moved to a new network path
    pub fn on_connection_migration(&self) {
        tracing::debug!("resetting rtt estimates after connection migration");

        self.latest_rtt.store(Duration::ZERO);
        self.min_rtt.store(Duration::ZERO);
        self.smoothed_rtt.store(Duration::ZERO);
        self.mean_deviation.store(Duration::ZERO);
    }

    /// Raises `smoothed_rtt` to `latest_rtt` if the latest sample is larger, and the
    /// mean deviation to the latest deviation if that is larger
    ///
    /// Used after an idle period has left the smoothed values stale.
    pub fn expire_smoothed_metrics(&self) {
        let mean_deviation = self.mean_deviation.load();
        let smoothed_rtt = self.smoothed_rtt.load();
        let latest_rtt = self.latest_rtt.load();

        self.mean_deviation
            .store(mean_deviation.max(abs_difference(smoothed_rtt, latest_rtt)));
        self.smoothed_rtt.store(smoothed_rtt.max(latest_rtt));
    }
}

/// A `Duration` stored as nanoseconds in an `AtomicU64`
#[derive(Debug)]
struct AtomicDuration(AtomicU64);

impl AtomicDuration {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    fn load(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: Duration) {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        self.0.store(nanos, Ordering::Relaxed);
    }
}

#[inline]
fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[inline]
fn abs_difference(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn snapshot(rtt: &RttEstimator) -> [Duration; 4] {
        [
            rtt.min_rtt(),
            rtt.latest_rtt(),
            rtt.smoothed_rtt(),
            rtt.mean_deviation(),
        ]
    }

    #[test]
    fn no_samples() {
        let rtt = RttEstimator::new();
        assert_eq!(snapshot(&rtt), [Duration::ZERO; 4]);
        assert_eq!(rtt.smoothed_or_initial_rtt(), DEFAULT_INITIAL_RTT);
    }

    #[test]
    fn first_sample() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);

        assert_eq!(rtt.min_rtt(), ms(100));
        assert_eq!(rtt.latest_rtt(), ms(100));
        assert_eq!(rtt.smoothed_rtt(), ms(100));
        assert_eq!(rtt.mean_deviation(), ms(50));
        assert_eq!(rtt.smoothed_or_initial_rtt(), ms(100));
    }

    #[test]
    fn weighted_average() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);
        rtt.update(ms(200), Duration::ZERO, now + ms(200));

        // 7/8 * 100ms + 1/8 * 200ms
        assert_eq!(rtt.smoothed_rtt(), Duration::from_micros(112_500));
        // 3/4 * 50ms + 1/4 * |100ms - 200ms|
        assert_eq!(rtt.mean_deviation(), Duration::from_micros(62_500));
        assert_eq!(rtt.latest_rtt(), ms(200));
        assert_eq!(rtt.min_rtt(), ms(100));
    }

    #[test]
    fn weighted_average_truncates_to_micros() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(Duration::from_nanos(1_000_999), Duration::ZERO, now);
        rtt.update(Duration::from_nanos(2_000_999), Duration::ZERO, now);

        // (7 * 1000us + 2000us) / 8 = 1125us
        assert_eq!(rtt.smoothed_rtt(), Duration::from_micros(1125));
        // (3 * 500us + 1000us) / 4 = 625us
        assert_eq!(rtt.mean_deviation(), Duration::from_micros(625));
    }

    #[test]
    fn ack_delay_is_subtracted() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);
        rtt.update(ms(300), ms(50), now);

        assert_eq!(rtt.latest_rtt(), ms(250));
        assert_eq!(rtt.min_rtt(), ms(100));
    }

    #[test]
    fn ack_delay_is_not_subtracted_below_min_rtt() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);
        rtt.update(ms(120), ms(50), now);

        assert_eq!(rtt.latest_rtt(), ms(120));
    }

    #[test]
    fn min_rtt_uses_raw_send_delta() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);
        rtt.update(ms(90), ms(50), now);

        assert_eq!(rtt.min_rtt(), ms(90));
        assert_eq!(rtt.latest_rtt(), ms(90));
    }

    #[test]
    fn first_sample_with_ack_delay() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        // min_rtt is the send delta itself, so no ack delay can be subtracted
        rtt.update(ms(100), ms(10), now);

        assert_eq!(rtt.latest_rtt(), ms(100));
        assert_eq!(rtt.smoothed_rtt(), ms(100));
    }

    #[test]
    fn invalid_samples_are_ignored() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();

        rtt.update(Duration::ZERO, Duration::ZERO, now);
        assert_eq!(snapshot(&rtt), [Duration::ZERO; 4]);

        rtt.update(ms(100), ms(10), now);
        let before = snapshot(&rtt);

        rtt.update(Duration::ZERO, Duration::ZERO, now);
        rtt.update(INFINITE_DURATION, Duration::ZERO, now);
        rtt.update(Duration::MAX, ms(10), now);
        assert_eq!(snapshot(&rtt), before);
    }

    #[test]
    fn connection_migration_resets() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);
        rtt.update(ms(300), ms(20), now);

        rtt.on_connection_migration();
        assert_eq!(snapshot(&rtt), [Duration::ZERO; 4]);
        assert_eq!(rtt.smoothed_or_initial_rtt(), DEFAULT_INITIAL_RTT);

        // the next sample behaves like the very first one
        rtt.update(ms(400), Duration::ZERO, now);
        assert_eq!(rtt.min_rtt(), ms(400));
        assert_eq!(rtt.smoothed_rtt(), ms(400));
        assert_eq!(rtt.mean_deviation(), ms(200));
    }

    #[test]
    fn expire_smoothed_metrics() {
        let rtt = RttEstimator::new();
        let now = NoopClock.get_time();
        rtt.update(ms(100), Duration::ZERO, now);
        rtt.update(ms(500), Duration::ZERO, now);

        // 7/8 * 100ms + 1/8 * 500ms
        assert_eq!(rtt.smoothed_rtt(), ms(150));
        // 3/4 * 50ms + 1/4 * 400ms
        assert_eq!(rtt.mean_deviation(), Duration::from_micros(137_500));

        rtt.expire_smoothed_metrics();
        assert_eq!(rtt.smoothed_rtt(), ms(500));
        assert_eq!(rtt.mean_deviation(), ms(350));

        // a latest sample below the smoothed value leaves it in place
        rtt.update(ms(100), Duration::ZERO, now);
        let smoothed_rtt = rtt.smoothed_rtt();
        let mean_deviation = rtt.mean_deviation();
        rtt.expire_smoothed_metrics();
        assert_eq!(rtt.smoothed_rtt(), smoothed_rtt);
        assert_eq!(
            rtt.mean_deviation(),
            mean_deviation.max(smoothed_rtt - ms(100))
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn sample_invariants() {
        bolero::check!()
            .with_type::<Vec<(u32, u16)>>()
            .for_each(|samples| {
                let rtt = RttEstimator::new();
                let now = NoopClock.get_time();
                let mut prev_min_rtt = None;

                for (send_delta, ack_delay) in samples.iter().copied() {
                    let send_delta = Duration::from_micros(send_delta as u64);
                    let ack_delay = Duration::from_micros(ack_delay as u64);
                    rtt.update(send_delta, ack_delay, now);

                    if rtt.smoothed_rtt().is_zero() {
                        assert_eq!(snapshot(&rtt), [Duration::ZERO; 4]);
                        continue;
                    }

                    if let Some(prev_min_rtt) = prev_min_rtt {
                        assert!(rtt.min_rtt() <= prev_min_rtt);
                    }
                    prev_min_rtt = Some(rtt.min_rtt());

                    assert!(rtt.latest_rtt() >= rtt.min_rtt());
                }
            });
    }

    #[cfg(loom)]
    #[test]
    fn concurrent_update_and_read() {
        use crate::sync::Arc;

        loom::model(|| {
            let rtt = Arc::new(RttEstimator::new());
            let now = NoopClock.get_time();

            let receiver = {
                let rtt = rtt.clone();
                loom::thread::spawn(move || {
                    rtt.update(ms(100), Duration::ZERO, now);
                    rtt.update(ms(200), Duration::ZERO, now);
                })
            };

            let observed = rtt.smoothed_or_initial_rtt();
            assert!([DEFAULT_INITIAL_RTT, ms(100), Duration::from_micros(112_500)]
                .contains(&observed));

            receiver.join().unwrap();
            assert_eq!(rtt.smoothed_rtt(), Duration::from_micros(112_500));
        });
    }
}
