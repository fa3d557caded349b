// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::PacketNumber,
    recovery::{
        bandwidth,
        congestion_controller::{CongestionController, Introspect, PacketEvent, SentPacket},
        Bandwidth, ConnectionStats, HybridSlowStart, Prr, RttEstimator, Settings,
        INFINITE_DURATION,
    },
    time::Timestamp,
};
use core::time::Duration;
use std::{collections::BTreeSet, sync::Arc};


/// The multiplicative decrease applied to the window of a single flow on loss
pub const RENO_BETA: f32 = 0.7;

/// Headroom, in datagrams, under which the window counts as fully used
const MAX_BURST_PACKETS: u64 = 3;

//= https://www.rfc-editor.org/rfc/rfc9002.txt#7.7
//# Using a value for "N" that is small, but at least 1 (for example, 1.25) ensures
//# that variations in RTT do not result in underutilization of the congestion window.
const PACING_N_NUMERATOR: u128 = 5;
const PACING_N_DENOMINATOR: u128 = 4;
// Slow start doubles the window every round, so it is paced at twice the rate
const SLOW_START_PACING_N: u128 = 2;

/// A NewReno congestion controller with Hybrid Slow Start and Proportional Rate
/// Reduction
///
/// The controller can emulate `n` parallel connections, which scales the
/// congestion avoidance growth by `n` and makes the backoff on loss gentler.
#[derive(Clone, Debug)]
pub struct RenoCongestionController {
    rtt_estimator: Arc<RttEstimator>,
    settings: Settings,
    hybrid_slow_start: HybridSlowStart,
    prr: Prr,
    stats: ConnectionStats,
    bandwidth_filter: bandwidth::Filter,
    /// Retransmittable packets that have been neither acknowledged nor lost
    outstanding: BTreeSet<PacketNumber>,
    largest_sent_packet_number: Option<PacketNumber>,
    largest_acked_packet_number: Option<PacketNumber>,
    /// The largest packet sent when the window was last reduced. Losses of
    /// packets up to this one belong to the same congestion event.
    largest_sent_at_last_cutback: Option<PacketNumber>,
    /// Whether the last window reduction happened in slow start
    last_cutback_exited_slow_start: bool,
    /// Acks counted towards the next window increase in congestion avoidance
    num_acked_packets: u64,
    congestion_window: u64,
    slow_start_threshold: u64,
    /// The floor for the window while losses reduce it in slow start
    min_slow_start_exit_window: u64,
    num_connections: u32,
    slow_start_large_reduction: bool,
}

impl RenoCongestionController {
    pub fn new(rtt_estimator: Arc<RttEstimator>, settings: Settings) -> Self {
        let bandwidth_filter =
            bandwidth::Filter::new(settings.bandwidth_window(), settings.min_rtt_window());

        Self {
            rtt_estimator,
            hybrid_slow_start: HybridSlowStart::new(),
            prr: Prr::new(),
            stats: ConnectionStats::default(),
            bandwidth_filter,
            outstanding: BTreeSet::new(),
            largest_sent_packet_number: None,
            largest_acked_packet_number: None,
            largest_sent_at_last_cutback: None,
            last_cutback_exited_slow_start: false,
            num_acked_packets: 0,
            congestion_window: settings.initial_window(),
            //= https://www.rfc-editor.org/rfc/rfc9002.txt#7.3.1
            //# A sender begins in slow start because the slow start threshold
            //# is initialized to an infinite value.
            slow_start_threshold: settings.max_window(),
            min_slow_start_exit_window: settings.min_window(),
            num_connections: settings.num_emulated_connections(),
            slow_start_large_reduction: settings.slow_start_large_reduction(),
            settings,
        }
    }

    #[inline]
    pub fn in_slow_start(&self) -> bool {
        self.congestion_window < self.slow_start_threshold
    }

    /// Returns true until a packet sent after the last window reduction is acknowledged
    #[inline]
    pub fn in_recovery(&self) -> bool {
        match (
            self.largest_acked_packet_number,
            self.largest_sent_at_last_cutback,
        ) {
            (Some(largest_acked), Some(last_cutback)) => largest_acked <= last_cutback,
            _ => false,
        }
    }

    #[inline]
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    #[inline]
    pub fn bandwidth_filter(&self) -> &bandwidth::Filter {
        &self.bandwidth_filter
    }

    #[inline]
    fn max_datagram_size(&self) -> u64 {
        self.settings.max_datagram_size() as u64
    }

    /// Returns true if the window is close enough to being used up for acks to
    /// grow it
    fn is_congestion_window_limited(&self, bytes_in_flight: u64) -> bool {
        let congestion_window = self.congestion_window;
        if bytes_in_flight >= congestion_window {
            return true;
        }

        let available_bytes = congestion_window - bytes_in_flight;
        let slow_start_limited = self.in_slow_start() && bytes_in_flight > congestion_window / 2;
        slow_start_limited || available_bytes <= MAX_BURST_PACKETS * self.max_datagram_size()
    }

    fn maybe_increase_congestion_window(&mut self, prior_in_flight: u64) {
        // Only grow the window while the sender is close to using all of it
        if !self.is_congestion_window_limited(prior_in_flight) {
            return;
        }

        let max_window = self.settings.max_window();
        if self.congestion_window >= max_window {
            return;
        }

        let max_datagram_size = self.max_datagram_size();

        if self.in_slow_start() {
            // exponential growth, one datagram per ack
            self.congestion_window = (self.congestion_window + max_datagram_size).min(max_window);
            return;
        }

        // Classic Reno congestion avoidance: one datagram per window of acks,
        // sped up by the number of emulated connections
        self.num_acked_packets += 1;
        if self.num_acked_packets * self.num_connections as u64
            >= self.congestion_window / max_datagram_size
        {
            self.congestion_window = (self.congestion_window + max_datagram_size).min(max_window);
            self.num_acked_packets = 0;
        }
    }

    /// The time between paced packets: the smoothed RTT spread over the
    /// window, scaled down by the pacing gain
    fn pacing_interval(&self) -> Duration {
        let rtt = self.rtt_estimator.smoothed_or_initial_rtt().as_nanos();
        let interval =
            rtt * self.max_datagram_size() as u128 / self.congestion_window.max(1) as u128;

        let interval = if self.in_slow_start() {
            interval / SLOW_START_PACING_N
        } else {
            interval * PACING_N_DENOMINATOR / PACING_N_NUMERATOR
        };

        Duration::from_nanos(u64::try_from(interval).unwrap_or(u64::MAX))
    }

    fn on_congestion_event(&mut self, prior_in_flight: u64) {
        let in_slow_start = self.in_slow_start();
        let max_datagram_size = self.max_datagram_size();

        self.last_cutback_exited_slow_start = in_slow_start;
        self.prr.on_congestion_event(prior_in_flight);

        if self.slow_start_large_reduction && in_slow_start {
            if self.congestion_window >= 2 * self.settings.initial_window() {
                self.min_slow_start_exit_window = self.congestion_window / 2;
            }
            self.congestion_window = self.congestion_window.saturating_sub(max_datagram_size);
        } else {
            self.congestion_window = (self.congestion_window as f32 * self.reno_beta()) as u64;
        }

        self.congestion_window = self.congestion_window.max(self.settings.min_window());
        self.slow_start_threshold = self.congestion_window;
        self.largest_sent_at_last_cutback = self.largest_sent_packet_number;
        // start counting again once recovery is over
        self.num_acked_packets = 0;

        tracing::debug!(
            congestion_window = self.congestion_window,
            largest_sent_at_last_cutback = ?self.largest_sent_at_last_cutback,
            exited_slow_start = in_slow_start,
            "entering recovery"
        );
    }
}

impl CongestionController for RenoCongestionController {
    fn time_until_send(&self, bytes_in_flight: u64) -> Duration {
        if self.in_recovery() {
            // PRR decides how much may be sent in recovery
            return if self.prr.can_send(
                self.congestion_window,
                bytes_in_flight,
                self.slow_start_threshold,
                self.max_datagram_size(),
            ) {
                Duration::ZERO
            } else {
                INFINITE_DURATION
            };
        }

        if bytes_in_flight >= self.congestion_window {
            return INFINITE_DURATION;
        }

        self.pacing_interval()
    }

    fn on_packet_sent(&mut self, packet: SentPacket) {
        if !packet.is_retransmittable {
            tracing::trace!(
                packet_number = %packet.packet_number,
                "packet is not subject to congestion control"
            );
            return;
        }

        debug_assert!(
            self.largest_sent_packet_number
                .map_or(true, |largest| packet.packet_number > largest),
            "packet numbers must be sent in increasing order"
        );

        if self.in_recovery() {
            self.prr.on_packet_sent(packet.bytes);
        }

        self.largest_sent_packet_number = Some(packet.packet_number);
        self.hybrid_slow_start.on_packet_sent(packet.packet_number);
        self.outstanding.insert(packet.packet_number);
    }

    #[inline]
    fn congestion_window(&self) -> u64 {
        self.congestion_window
    }

    fn maybe_exit_slow_start(&mut self) {
        if !self.in_slow_start() {
            return;
        }

        let congestion_window_packets = self.congestion_window / self.max_datagram_size();
        if self.hybrid_slow_start.should_exit_slow_start(
            self.rtt_estimator.latest_rtt(),
            self.rtt_estimator.min_rtt(),
            congestion_window_packets,
        ) {
            self.slow_start_threshold = self.congestion_window;
            tracing::debug!(
                congestion_window = self.congestion_window,
                "exiting slow start"
            );
        }
    }

    fn on_packet_acked(&mut self, event: PacketEvent) {
        if !self.outstanding.remove(&event.packet_number) {
            tracing::trace!(
                packet_number = %event.packet_number,
                "ignoring ack for a packet that is not outstanding"
            );
            return;
        }

        self.largest_acked_packet_number = self
            .largest_acked_packet_number
            .max(Some(event.packet_number));

        if self.in_recovery() {
            self.prr.on_ack(event.bytes);
            return;
        }

        self.maybe_increase_congestion_window(event.prior_in_flight);

        if self.in_slow_start() {
            self.hybrid_slow_start.on_packet_acked(event.packet_number);
        }

        debug_assert!(self.congestion_window >= self.settings.min_window());
    }

    fn on_packet_lost(&mut self, event: PacketEvent) {
        if !self.outstanding.remove(&event.packet_number) {
            tracing::trace!(
                packet_number = %event.packet_number,
                "ignoring loss of a packet that is not outstanding"
            );
            return;
        }

        //= https://www.rfc-editor.org/rfc/rfc6582#section-3.2
        //# the sender
        //# continues to use the reduced congestion window for all packets
        //# sent before the congestion event
        let is_same_congestion_event = self
            .largest_sent_at_last_cutback
            .map_or(false, |last_cutback| event.packet_number <= last_cutback);

        if !is_same_congestion_event {
            if self.in_slow_start() {
                self.stats.on_slow_start_loss(event.bytes);
            }
            self.on_congestion_event(event.prior_in_flight);
        } else if self.last_cutback_exited_slow_start {
            self.stats.on_slow_start_loss(event.bytes);

            if self.slow_start_large_reduction {
                // one datagram less for every loss, down to half the window at
                // the first loss
                self.congestion_window = self
                    .congestion_window
                    .saturating_sub(event.bytes)
                    .max(self.min_slow_start_exit_window)
                    .max(self.settings.min_window());
                self.slow_start_threshold = self.congestion_window;
            }
        }

        debug_assert!(self.congestion_window >= self.settings.min_window());
    }

    fn set_num_emulated_connections(&mut self, connections: u32) {
        self.num_connections = connections.max(1);
    }

    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {
        self.largest_sent_at_last_cutback = None;

        if !packets_retransmitted {
            return;
        }

        self.hybrid_slow_start.restart();
        self.slow_start_threshold = self.congestion_window / 2;
        self.congestion_window = self.settings.min_window();

        tracing::debug!(
            congestion_window = self.congestion_window,
            slow_start_threshold = self.slow_start_threshold,
            "retransmission timeout"
        );
    }

    fn on_connection_migration(&mut self) {
        tracing::debug!("resetting congestion controller after connection migration");

        self.hybrid_slow_start.restart();
        self.prr = Prr::new();
        self.stats.reset();
        self.bandwidth_filter.reset();
        self.outstanding.clear();
        self.largest_sent_packet_number = None;
        self.largest_acked_packet_number = None;
        self.largest_sent_at_last_cutback = None;
        self.last_cutback_exited_slow_start = false;
        self.num_acked_packets = 0;
        self.congestion_window = self.settings.initial_window();
        self.slow_start_threshold = self.settings.max_window();
        self.min_slow_start_exit_window = self.settings.min_window();
    }

    fn set_slow_start_large_reduction(&mut self, enabled: bool) {
        self.slow_start_large_reduction = enabled;
    }

    /// The windowed maximum of the delivery rate samples, falling back to the
    /// window spread over the smoothed RTT
    fn bandwidth_estimate(&self) -> Bandwidth {
        if let Some(max_bandwidth) = self.bandwidth_filter.max_bandwidth() {
            return max_bandwidth;
        }

        let smoothed_rtt = self.rtt_estimator.smoothed_rtt();
        if smoothed_rtt.is_zero() {
            return Bandwidth::INFINITY;
        }

        Bandwidth::new(self.congestion_window, smoothed_rtt)
    }

    #[inline]
    fn on_bandwidth_sample(&mut self, sample: bandwidth::Sample, now: Timestamp) {
        self.bandwidth_filter.on_sample(sample, now);
    }

    #[inline]
    fn introspect(&self) -> Option<&dyn Introspect> {
        Some(self)
    }
}

impl Introspect for RenoCongestionController {
    #[inline]
    fn hybrid_slow_start(&self) -> &HybridSlowStart {
        &self.hybrid_slow_start
    }

    #[inline]
    fn slow_start_threshold(&self) -> u64 {
        self.slow_start_threshold
    }

    #[inline]
    fn reno_beta(&self) -> f32 {
        // The backoff of `n` connections where only one of them halves its window
        let connections = self.num_connections as f32;
        (connections - 1.0 + RENO_BETA) / connections
    }

    #[inline]
    fn in_recovery(&self) -> bool {
        RenoCongestionController::in_recovery(self)
    }

    #[inline]
    fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}
