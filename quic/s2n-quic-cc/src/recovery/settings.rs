// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::io::{self, PacketConn};
use core::time::Duration;

/// The smallest datagram size every QUIC path is required to support
pub const MIN_MAX_DATAGRAM_SIZE: u16 = 1200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(&'static str);

/// Congestion controller configuration
///
/// Windows are configured in packets and reported in bytes, scaled by the
/// maximum datagram size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub(crate) max_datagram_size: u16,
    pub(crate) initial_window_packets: u32,
    pub(crate) min_window_packets: u32,
    pub(crate) max_window_packets: u32,
    pub(crate) num_emulated_connections: u32,
    pub(crate) slow_start_large_reduction: bool,
    pub(crate) bandwidth_window: Duration,
    pub(crate) min_rtt_window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! setter {
    ($(#[doc = $doc:literal])* $name:ident, $field:ident, $inner:ty) => {
        $(#[doc = $doc])*
        pub fn $name(mut self, value: $inner) -> Result<Self, ValidationError> {
            self.$field = value;
            self.validate()?;
            Ok(self)
        }
    };
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            max_datagram_size: 1252,
            initial_window_packets: 32,
            min_window_packets: 2,
            max_window_packets: 10_000,
            num_emulated_connections: 1,
            slow_start_large_reduction: false,
            bandwidth_window: Duration::from_secs(1),
            min_rtt_window: Duration::from_secs(10),
        }
    }

    setter!(
        /// Must be at least [`MIN_MAX_DATAGRAM_SIZE`]
        with_max_datagram_size,
        max_datagram_size,
        u16
    );
    setter!(with_initial_window_packets, initial_window_packets, u32);
    setter!(with_min_window_packets, min_window_packets, u32);
    setter!(with_max_window_packets, max_window_packets, u32);
    setter!(
        /// Must be at least 1
        with_num_emulated_connections,
        num_emulated_connections,
        u32
    );
    setter!(
        with_slow_start_large_reduction,
        slow_start_large_reduction,
        bool
    );
    setter!(with_bandwidth_window, bandwidth_window, Duration);
    setter!(with_min_rtt_window, min_rtt_window, Duration);

    /// Shrinks the maximum datagram size by the envelope `conn` reserves in
    /// each datagram
    pub fn for_connection<C: PacketConn + ?Sized>(
        self,
        conn: &C,
    ) -> Result<Self, ValidationError> {
        let max_datagram_size = io::max_datagram_size(conn, self.max_datagram_size);
        self.with_max_datagram_size(max_datagram_size)
    }

    #[inline]
    pub fn max_datagram_size(&self) -> u16 {
        self.max_datagram_size
    }

    #[inline]
    pub fn num_emulated_connections(&self) -> u32 {
        self.num_emulated_connections
    }

    #[inline]
    pub fn slow_start_large_reduction(&self) -> bool {
        self.slow_start_large_reduction
    }

    #[inline]
    pub fn bandwidth_window(&self) -> Duration {
        self.bandwidth_window
    }

    #[inline]
    pub fn min_rtt_window(&self) -> Duration {
        self.min_rtt_window
    }

    /// The congestion window a connection starts with, in bytes
    #[inline]
    pub fn initial_window(&self) -> u64 {
        self.packets_to_bytes(self.initial_window_packets)
    }

    /// The smallest congestion window, in bytes
    #[inline]
    pub fn min_window(&self) -> u64 {
        self.packets_to_bytes(self.min_window_packets)
    }

    /// The largest congestion window, in bytes
    #[inline]
    pub fn max_window(&self) -> u64 {
        self.packets_to_bytes(self.max_window_packets)
    }

    #[inline]
    fn packets_to_bytes(&self, packets: u32) -> u64 {
        packets as u64 * self.max_datagram_size as u64
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_datagram_size < MIN_MAX_DATAGRAM_SIZE {
            return Err(ValidationError("max_datagram_size is below the QUIC minimum"));
        }

        if self.min_window_packets == 0 {
            return Err(ValidationError("min_window_packets must be at least 1"));
        }

        if self.initial_window_packets < self.min_window_packets {
            return Err(ValidationError(
                "initial_window_packets is below min_window_packets",
            ));
        }

        if self.initial_window_packets > self.max_window_packets {
            return Err(ValidationError(
                "initial_window_packets is above max_window_packets",
            ));
        }

        if self.num_emulated_connections == 0 {
            return Err(ValidationError("num_emulated_connections must be at least 1"));
        }

        if self.bandwidth_window.is_zero() || self.min_rtt_window.is_zero() {
            return Err(ValidationError("filter windows must be non-zero"));
        }

        Ok(())
    }
}
