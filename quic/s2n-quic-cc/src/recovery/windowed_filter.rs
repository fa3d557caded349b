// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::Timestamp;
use core::{marker::PhantomData, time::Duration};


/// Tracks the best, second best and third best value seen over a sliding time
/// window of length `window_length`
///
/// The three estimates are kept in constant space, ordered both by value and by
/// time: the best estimate is the oldest, and each of the others is more recent
/// and no better than the one ranked above it. When the best estimate ages out
/// of the window, the second and third best are promoted, so the filter keeps
/// reporting a nearly-as-good value instead of losing all history at once.
///
/// Based on Kathleen Nichols' windowed min/max algorithm, as used by the Linux
/// kernel's `lib/minmax.c` and BBR.
#[derive(Clone, Debug)]
pub struct WindowedFilter<T, FilterType> {
    estimates: Option<[Estimate<T>; 3]>,
    window_length: Duration,
    filter: PhantomData<FilterType>,
}

/// A value along with the time it was recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Estimate<T> {
    pub value: T,
    pub time: Timestamp,
}

pub trait Filter<T> {
    /// Returns true if the `new` value is at least as extreme as `current`
    ///
    /// Ties favor the new value, so a repeated record refreshes its timestamp.
    fn supersedes(new: T, current: T) -> bool;
}

#[derive(Clone, Debug)]
pub struct MaxFilter;
#[derive(Clone, Debug)]
pub struct MinFilter;

impl<T: PartialOrd> Filter<T> for MaxFilter {
    #[inline]
    fn supersedes(new: T, current: T) -> bool {
        new >= current
    }
}

impl<T: PartialOrd> Filter<T> for MinFilter {
    #[inline]
    fn supersedes(new: T, current: T) -> bool {
        new <= current
    }
}

/// Filter that maintains the maximum values seen over the window
pub type WindowedMaxFilter<T> = WindowedFilter<T, MaxFilter>;
/// Filter that maintains the minimum values seen over the window
pub type WindowedMinFilter<T> = WindowedFilter<T, MinFilter>;

impl<T: Copy + PartialOrd + Default, FilterType: Filter<T>> WindowedFilter<T, FilterType> {
    /// Constructs a new `WindowedFilter` with the specified `window_length`
    pub fn new(window_length: Duration) -> Self {
        Self {
            estimates: None,
            window_length,
            filter: PhantomData,
        }
    }

    /// The length of the window estimates are kept for
    #[inline]
    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    /// Returns true if the filter has not received a sample since it was
    /// created or reset
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.estimates.is_none()
    }

    /// The best value in the window, or `T::default()` if empty
    #[inline]
    pub fn best(&self) -> T {
        self.value(0)
    }

    /// The second best value in the window, or `T::default()` if empty
    #[inline]
    pub fn second_best(&self) -> T {
        self.value(1)
    }

    /// The third best value in the window, or `T::default()` if empty
    #[inline]
    pub fn third_best(&self) -> T {
        self.value(2)
    }

    /// The best value recorded no longer than a window before `now`
    ///
    /// Unlike [`Self::best`], this accounts for estimates that aged out since
    /// the last update.
    pub fn best_in_window(&self, now: Timestamp) -> Option<T> {
        self.estimates
            .as_ref()?
            .iter()
            .find(|estimate| now - estimate.time <= self.window_length)
            .map(|estimate| estimate.value)
    }

    /// Returns the ranked estimates, best first, if any sample has been recorded
    #[inline]
    pub fn estimates(&self) -> Option<&[Estimate<T>; 3]> {
        self.estimates.as_ref()
    }

    /// Discards all estimates
    #[inline]
    pub fn reset(&mut self) {
        self.estimates = None;
    }

    /// Updates the filter with a `value` observed at `now`
    ///
    /// `now` is expected to be non-decreasing between calls. A sample older than
    /// the current estimates is treated as if it happened at the same time as
    /// them.
    pub fn update(&mut self, value: T, now: Timestamp) {
        let sample = Estimate { value, time: now };

        let Some(estimates) = self.estimates.as_mut() else {
            self.estimates = Some([sample; 3]);
            return;
        };

        // A new best value restarts the window, as does the third best value
        // falling out of it, since the other two are even older.
        if FilterType::supersedes(value, estimates[0].value)
            || now - estimates[2].time > self.window_length
        {
            *estimates = [sample; 3];
            return;
        }

        if FilterType::supersedes(value, estimates[1].value) {
            estimates[1] = sample;
            estimates[2] = sample;
        } else if FilterType::supersedes(value, estimates[2].value) {
            estimates[2] = sample;
        }

        if now - estimates[0].time > self.window_length {
            // The best estimate hasn't been updated for an entire window, so
            // promote the second and third best estimates.
            estimates[0] = estimates[1];
            estimates[1] = estimates[2];
            estimates[2] = sample;

            // The promoted estimate may be outside the window as well. The third
            // best was checked on entry so one more promotion is enough.
            if now - estimates[0].time > self.window_length {
                estimates[0] = estimates[1];
                estimates[1] = estimates[2];
            }
            return;
        }

        if estimates[1].value == estimates[0].value
            && now - estimates[1].time > self.window_length / 4
        {
            // A quarter of the window passed without a better sample, so take the
            // second best estimate from the second quarter of the window.
            estimates[1] = sample;
            estimates[2] = sample;
            return;
        }

        if estimates[2].value == estimates[1].value
            && now - estimates[2].time > self.window_length / 2
        {
            // Half the window passed without a better sample, so take the third
            // best estimate from the second half of the window.
            estimates[2] = sample;
        }
    }

    #[inline]
    fn value(&self, rank: usize) -> T {
        self.estimates
            .as_ref()
            .map_or_else(T::default, |estimates| estimates[rank].value)
    }
}
