// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::PacketNumber,
    recovery::{bandwidth, Bandwidth, ConnectionStats, HybridSlowStart},
    time::Timestamp,
};
use core::{fmt, time::Duration};

/// A packet handed to the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentPacket {
    pub time_sent: Timestamp,
    /// Bytes in flight before this packet was sent
    pub bytes_in_flight: u64,
    pub packet_number: PacketNumber,
    pub bytes: u64,
    /// Packets that carry no retransmittable frames, such as ACK-only packets,
    /// are not subject to congestion control
    pub is_retransmittable: bool,
}

/// The delivery outcome of a previously sent packet, reported when the packet
/// is either acknowledged or declared lost
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketEvent {
    pub packet_number: PacketNumber,
    pub bytes: u64,
    /// Bytes in flight before the acknowledgement or loss was processed
    pub prior_in_flight: u64,
    pub event_time: Timestamp,
    /// The smallest packet number that has not been acknowledged yet
    pub least_unacked: PacketNumber,
}

/// The operations a pluggable congestion control algorithm implements
///
/// The trait is object safe so a connection can hold a
/// `Box<dyn CongestionController>` chosen at runtime. Implementations are
/// driven by a single serialized event stream and need no internal locking.
pub trait CongestionController: Send + fmt::Debug {
    /// Returns how long the sender must wait before the next packet may be sent
    ///
    /// `Duration::ZERO` means a packet may be sent immediately. A congestion
    /// limited sender returns [`INFINITE_DURATION`](crate::recovery::INFINITE_DURATION).
    fn time_until_send(&self, bytes_in_flight: u64) -> Duration;

    fn on_packet_sent(&mut self, packet: SentPacket);

    /// The current congestion window, in bytes
    fn congestion_window(&self) -> u64;

    /// Leaves slow start if the delay increase heuristics detect a full pipe
    fn maybe_exit_slow_start(&mut self);

    /// Acknowledgements for packets that are not outstanding are ignored
    fn on_packet_acked(&mut self, event: PacketEvent);

    /// Losses of packets that are not outstanding are ignored
    fn on_packet_lost(&mut self, event: PacketEvent);

    /// Makes the controller behave like `connections` parallel flows
    fn set_num_emulated_connections(&mut self, connections: u32);

    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool);

    /// Resets all state that depends on the network path
    fn on_connection_migration(&mut self);

    fn set_slow_start_large_reduction(&mut self, enabled: bool);

    fn bandwidth_estimate(&self) -> Bandwidth;

    /// Delivers a bandwidth sample taken while processing an acknowledgement
    #[inline]
    fn on_bandwidth_sample(&mut self, sample: bandwidth::Sample, now: Timestamp) {
        let _ = (sample, now);
    }

    /// Returns the debug introspection capability, if the algorithm has one
    #[inline]
    fn introspect(&self) -> Option<&dyn Introspect> {
        None
    }
}

/// Internal state exposed by algorithms for diagnostics and testing
pub trait Introspect {
    fn hybrid_slow_start(&self) -> &HybridSlowStart;

    /// The slow start threshold, in bytes
    fn slow_start_threshold(&self) -> u64;

    /// The multiplicative decrease applied to the window on loss
    fn reno_beta(&self) -> f32;

    fn in_recovery(&self) -> bool;

    fn stats(&self) -> &ConnectionStats;
}

impl<CC: CongestionController + ?Sized> CongestionController for Box<CC> {
    #[inline]
    fn time_until_send(&self, bytes_in_flight: u64) -> Duration {
        (**self).time_until_send(bytes_in_flight)
    }

    #[inline]
    fn on_packet_sent(&mut self, packet: SentPacket) {
        (**self).on_packet_sent(packet)
    }

    #[inline]
    fn congestion_window(&self) -> u64 {
        (**self).congestion_window()
    }

    #[inline]
    fn maybe_exit_slow_start(&mut self) {
        (**self).maybe_exit_slow_start()
    }

    #[inline]
    fn on_packet_acked(&mut self, event: PacketEvent) {
        (**self).on_packet_acked(event)
    }

    #[inline]
    fn on_packet_lost(&mut self, event: PacketEvent) {
        (**self).on_packet_lost(event)
    }

    #[inline]
    fn set_num_emulated_connections(&mut self, connections: u32) {
        (**self).set_num_emulated_connections(connections)
    }

    #[inline]
    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {
        (**self).on_retransmission_timeout(packets_retransmitted)
    }

    #[inline]
    fn on_connection_migration(&mut self) {
        (**self).on_connection_migration()
    }

    #[inline]
    fn set_slow_start_large_reduction(&mut self, enabled: bool) {
        (**self).set_slow_start_large_reduction(enabled)
    }

    #[inline]
    fn bandwidth_estimate(&self) -> Bandwidth {
        (**self).bandwidth_estimate()
    }

    #[inline]
    fn on_bandwidth_sample(&mut self, sample: bandwidth::Sample, now: Timestamp) {
        (**self).on_bandwidth_sample(sample, now)
    }

    #[inline]
    fn introspect(&self) -> Option<&dyn Introspect> {
        (**self).introspect()
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A controller with a fixed window that records the events it receives
    #[derive(Clone, Debug, Default)]
    pub struct MockCongestionController {
        pub congestion_window: u64,
        pub sent: Vec<SentPacket>,
        pub acked: Vec<PacketEvent>,
        pub lost: Vec<PacketEvent>,
        pub bandwidth_samples: Vec<bandwidth::Sample>,
        pub slow_start_exit_checks: usize,
        pub retransmission_timeouts: usize,
        pub migrations: usize,
    }

    impl MockCongestionController {
        pub fn new(congestion_window: u64) -> Self {
            Self {
                congestion_window,
                ..Default::default()
            }
        }
    }

    impl CongestionController for MockCongestionController {
        fn time_until_send(&self, bytes_in_flight: u64) -> Duration {
            if bytes_in_flight < self.congestion_window {
                Duration::ZERO
            } else {
                crate::recovery::INFINITE_DURATION
            }
        }

        fn on_packet_sent(&mut self, packet: SentPacket) {
            self.sent.push(packet);
        }

        fn congestion_window(&self) -> u64 {
            self.congestion_window
        }

        fn maybe_exit_slow_start(&mut self) {
            self.slow_start_exit_checks += 1;
        }

        fn on_packet_acked(&mut self, event: PacketEvent) {
            self.acked.push(event);
        }

        fn on_packet_lost(&mut self, event: PacketEvent) {
            self.lost.push(event);
        }

        fn set_num_emulated_connections(&mut self, _connections: u32) {}

        fn on_retransmission_timeout(&mut self, _packets_retransmitted: bool) {
            self.retransmission_timeouts += 1;
        }

        fn on_connection_migration(&mut self) {
            self.migrations += 1;
        }

        fn set_slow_start_large_reduction(&mut self, _enabled: bool) {}

        fn bandwidth_estimate(&self) -> Bandwidth {
            self.bandwidth_samples
                .last()
                .map_or(Bandwidth::ZERO, |sample| sample.bandwidth())
        }

        fn on_bandwidth_sample(&mut self, sample: bandwidth::Sample, _now: Timestamp) {
            self.bandwidth_samples.push(sample);
        }
    }
}
