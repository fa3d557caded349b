// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::PacketNumber;
use core::time::Duration;

/// An implementation of the Hybrid Slow Start algorithm described in
/// "Hybrid Slow Start for High-Bandwidth and Long-Distance Networks"
/// https://pdfs.semanticscholar.org/25e9/ef3f03315782c7f1cbcd31b587857adae7d1.pdf
///
/// Rounds are delimited by packet numbers: a round ends once a packet sent after
/// the round started is acknowledged. The constants are based on
/// https://github.com/torvalds/linux/blob/net/ipv4/tcp_cubic.c
#[derive(Clone, Debug, Default)]
pub struct HybridSlowStart {
    /// The last packet sent in the current round
    end_packet_number: Option<PacketNumber>,
    last_sent_packet_number: Option<PacketNumber>,
    started: bool,
    current_min_rtt: Option<Duration>,
    rtt_sample_count: usize,
    found: bool,
}

/// Minimum congestion window, in packets, before slow start can be exited.
/// Defined as "hystart_low_window" in tcp_cubic.c
const LOW_WINDOW: u64 = 16;
/// Number of samples required before determining the slow start exit.
/// Defined as "HYSTART_MIN_SAMPLES" in tcp_cubic.c
const N_SAMPLING: usize = 8;
/// Minimum increase in delay to consider. Defined as "HYSTART_DELAY_MIN" in tcp_cubic.c
const MIN_DELAY_THRESHOLD: Duration = Duration::from_millis(4);
/// Maximum increase in delay to consider. Defined as "HYSTART_DELAY_MAX" in tcp_cubic.c
const MAX_DELAY_THRESHOLD: Duration = Duration::from_millis(16);
/// Factor for dividing the RTT to determine the threshold
const THRESHOLD_DIVIDEND: u32 = 8;

impl HybridSlowStart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a round is in progress
    #[inline]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Returns true if a delay increase has been detected since the last restart
    #[inline]
    pub fn found(&self) -> bool {
        self.found
    }

    /// Forgets the current round and any detected delay increase
    pub fn restart(&mut self) {
        self.started = false;
        self.found = false;
    }

    pub fn on_packet_sent(&mut self, packet_number: PacketNumber) {
        self.last_sent_packet_number = Some(packet_number);
    }

    /// Ends the current round if `packet_number` was sent after it started
    pub fn on_packet_acked(&mut self, packet_number: PacketNumber) {
        if self.is_end_of_round(packet_number) {
            self.started = false;
        }
    }

    /// Returns true if `packet_number` was sent after the current round started
    #[inline]
    pub fn is_end_of_round(&self, packet_number: PacketNumber) -> bool {
        self.end_packet_number
            .map_or(true, |end_packet_number| end_packet_number < packet_number)
    }

    /// Called with each RTT sample taken in slow start. Returns true if slow
    /// start should be exited.
    ///
    /// The minimum of the first samples of each round is compared with the
    /// path's `min_rtt`. A significant increase in delay indicates that queues
    /// are building, so the window is large enough to fill the pipe.
    pub fn should_exit_slow_start(
        &mut self,
        latest_rtt: Duration,
        min_rtt: Duration,
        congestion_window_packets: u64,
    ) -> bool {
        if !self.started {
            self.start_round();
        }

        if self.found {
            return true;
        }

        self.rtt_sample_count += 1;

        if self.rtt_sample_count <= N_SAMPLING {
            // Sample the delay, saving the minimum
            let current_min_rtt = self.current_min_rtt.unwrap_or(latest_rtt);
            self.current_min_rtt = Some(latest_rtt.min(current_min_rtt));
        }

        if let (N_SAMPLING, Some(current_min_rtt)) =
            (self.rtt_sample_count, self.current_min_rtt)
        {
            let threshold = min_rtt / THRESHOLD_DIVIDEND;
            // Clamp n to the min and max thresholds
            let threshold = threshold.clamp(MIN_DELAY_THRESHOLD, MAX_DELAY_THRESHOLD);

            if current_min_rtt > min_rtt + threshold {
                tracing::debug!(
                    ?current_min_rtt,
                    ?min_rtt,
                    ?threshold,
                    "hybrid slow start detected a delay increase"
                );
                self.found = true;
            }
        }

        congestion_window_packets >= LOW_WINDOW && self.found
    }

    fn start_round(&mut self) {
        self.end_packet_number = self.last_sent_packet_number;
        self.current_min_rtt = None;
        self.rtt_sample_count = 0;
        self.started = true;
    }
}
