// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::PacketNumber,
    recovery::{
        bandwidth::{self, Bandwidth},
        CongestionController, PacketEvent, RttEstimator, SentPacket,
    },
    time::Timestamp,
};
use core::time::Duration;
use std::{collections::BTreeMap, sync::Arc};

/// Correlates sent packets with acknowledgements and losses, feeding the RTT
/// estimator, delivery rate samples and the congestion controller
#[derive(Debug)]
pub struct Manager<CC> {
    rtt_estimator: Arc<RttEstimator>,
    congestion_controller: CC,
    sent_packets: BTreeMap<PacketNumber, SentPacketInfo>,
    bytes_in_flight: u64,
    /// Total bytes acknowledged on the path
    delivered_bytes: u64,
    /// The time `delivered_bytes` last increased
    delivered_time: Option<Timestamp>,
}

#[derive(Clone, Copy, Debug)]
struct SentPacketInfo {
    time_sent: Timestamp,
    bytes: u64,
    /// `delivered_bytes` and `delivered_time` when the packet was sent
    delivered_bytes: u64,
    delivered_time: Timestamp,
    is_app_limited: bool,
}

impl<CC: CongestionController> Manager<CC> {
    /// `congestion_controller` is expected to read its RTT from `rtt_estimator`
    pub fn new(rtt_estimator: Arc<RttEstimator>, congestion_controller: CC) -> Self {
        Self {
            rtt_estimator,
            congestion_controller,
            sent_packets: BTreeMap::new(),
            bytes_in_flight: 0,
            delivered_bytes: 0,
            delivered_time: None,
        }
    }

    #[inline]
    pub fn rtt_estimator(&self) -> &RttEstimator {
        &self.rtt_estimator
    }

    #[inline]
    pub fn congestion_controller(&self) -> &CC {
        &self.congestion_controller
    }

    #[inline]
    pub fn congestion_controller_mut(&mut self) -> &mut CC {
        &mut self.congestion_controller
    }

    /// Bytes of retransmittable packets neither acknowledged nor lost
    #[inline]
    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    #[inline]
    pub fn time_until_send(&self) -> Duration {
        self.congestion_controller
            .time_until_send(self.bytes_in_flight)
    }

    /// Records a packet handed to the transport
    ///
    /// `is_app_limited` marks packets sent while the application had nothing
    /// more to send, so their delivery rate underestimates the path.
    pub fn on_packet_sent(
        &mut self,
        packet_number: PacketNumber,
        bytes: u64,
        is_retransmittable: bool,
        is_app_limited: bool,
        now: Timestamp,
    ) {
        self.congestion_controller.on_packet_sent(SentPacket {
            time_sent: now,
            bytes_in_flight: self.bytes_in_flight,
            packet_number,
            bytes,
            is_retransmittable,
        });

        if !is_retransmittable {
            return;
        }

        // Delivery rate intervals start from the first packet sent after an idle period
        if self.bytes_in_flight == 0 {
            self.delivered_time = Some(now);
        }

        self.sent_packets.insert(
            packet_number,
            SentPacketInfo {
                time_sent: now,
                bytes,
                delivered_bytes: self.delivered_bytes,
                delivered_time: self.delivered_time.unwrap_or(now),
                is_app_limited,
            },
        );
        self.bytes_in_flight += bytes;
    }

    /// Processes an acknowledgement covering `packet_numbers`
    ///
    /// Packet numbers that are not in flight are ignored. An RTT sample is only
    /// taken if the largest acknowledged packet is newly acknowledged.
    pub fn on_ack_received<I: IntoIterator<Item = PacketNumber>>(
        &mut self,
        packet_numbers: I,
        ack_delay: Duration,
        now: Timestamp,
    ) {
        let mut largest_acked = None;
        let mut newly_acked = Vec::new();

        for packet_number in packet_numbers {
            largest_acked = largest_acked.max(Some(packet_number));

            if let Some(info) = self.sent_packets.remove(&packet_number) {
                newly_acked.push((packet_number, info));
            } else {
                tracing::trace!(%packet_number, "ignoring ack for a packet that is not in flight");
            }
        }

        newly_acked.sort_unstable_by_key(|(packet_number, _)| *packet_number);

        let Some(&(largest_newly_acked, largest_info)) = newly_acked.last() else {
            return;
        };

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.1
        //# An endpoint generates an RTT sample on receiving an ACK frame that
        //# meets the following two conditions:
        //#
        //# *  the largest acknowledged packet number is newly acknowledged, and
        //#
        //# *  at least one of the newly acknowledged packets was ack-eliciting.
        if largest_acked == Some(largest_newly_acked) {
            let send_delta = now - largest_info.time_sent;
            self.rtt_estimator.update(send_delta, ack_delay, now);
            self.congestion_controller.maybe_exit_slow_start();
        }

        let prior_in_flight = self.bytes_in_flight;
        for (_, info) in &newly_acked {
            self.delivered_bytes += info.bytes;
        }
        self.delivered_time = Some(now);

        // The delivery rate since the newest acknowledged packet was sent
        let delivered = self.delivered_bytes - largest_info.delivered_bytes;
        let interval = now - largest_info.delivered_time;
        let sample = bandwidth::Sample::new(
            Bandwidth::new(delivered, interval),
            now - largest_info.time_sent,
            largest_info.is_app_limited,
        );
        self.congestion_controller.on_bandwidth_sample(sample, now);

        for (packet_number, info) in newly_acked {
            debug_assert!(self.bytes_in_flight >= info.bytes);
            self.bytes_in_flight -= info.bytes;

            let least_unacked = self.least_unacked(packet_number);
            self.congestion_controller.on_packet_acked(PacketEvent {
                packet_number,
                bytes: info.bytes,
                prior_in_flight,
                event_time: now,
                least_unacked,
            });
        }
    }

    /// Declares a packet lost. Packets that are not in flight are ignored.
    pub fn on_packet_lost(&mut self, packet_number: PacketNumber, now: Timestamp) {
        let Some(info) = self.sent_packets.remove(&packet_number) else {
            tracing::trace!(%packet_number, "ignoring loss of a packet that is not in flight");
            return;
        };

        let prior_in_flight = self.bytes_in_flight;
        debug_assert!(self.bytes_in_flight >= info.bytes);
        self.bytes_in_flight -= info.bytes;

        let least_unacked = self.least_unacked(packet_number);
        self.congestion_controller.on_packet_lost(PacketEvent {
            packet_number,
            bytes: info.bytes,
            prior_in_flight,
            event_time: now,
            least_unacked,
        });
    }

    pub fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {
        // the path went quiet for a while, so the latest sample is the best estimate
        self.rtt_estimator.expire_smoothed_metrics();
        self.congestion_controller
            .on_retransmission_timeout(packets_retransmitted);
    }

    /// Resets the estimates of the old path. Packets still in flight on it are
    /// no longer tracked.
    pub fn on_connection_migration(&mut self) {
        self.rtt_estimator.on_connection_migration();
        self.congestion_controller.on_connection_migration();
        self.sent_packets.clear();
        self.bytes_in_flight = 0;
        self.delivered_bytes = 0;
        self.delivered_time = None;
    }

    fn least_unacked(&self, packet_number: PacketNumber) -> PacketNumber {
        self.sent_packets
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| packet_number.next())
    }
}
