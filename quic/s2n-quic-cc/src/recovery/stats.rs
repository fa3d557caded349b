// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Losses a congestion controller attributed to slow start
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    slow_start_packets_lost: u64,
    slow_start_bytes_lost: u64,
}

impl ConnectionStats {
    #[inline]
    pub fn slow_start_packets_lost(&self) -> u64 {
        self.slow_start_packets_lost
    }

    #[inline]
    pub fn slow_start_bytes_lost(&self) -> u64 {
        self.slow_start_bytes_lost
    }

    #[inline]
    pub(crate) fn on_slow_start_loss(&mut self, lost_bytes: u64) {
        self.slow_start_packets_lost += 1;
        self.slow_start_bytes_lost += lost_bytes;
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
