// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use ::std::time::Instant;

/// A wall clock measuring [`Timestamp`]s from an `Instant` epoch
///
/// Connections sharing an RTT estimator should share a clock, since timestamps
/// from clocks with different epochs can't be compared.
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    epoch: Instant,
}

impl Default for StdClock {
    /// A clock whose epoch is the time it was created
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl StdClock {
    pub const fn new(epoch: Instant) -> Self {
        Self { epoch }
    }

    #[inline]
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

impl Clock for StdClock {
    #[inline]
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed())
    }
}
