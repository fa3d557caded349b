// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Proportional Rate Reduction for the recovery period following a loss
///
/// https://www.rfc-editor.org/rfc/rfc6937.html
///
/// Rather than computing a byte allowance on every ack, the counters since the
/// congestion event are compared directly whenever the sender asks to send.
#[derive(Clone, Debug, Default)]
pub struct Prr {
    /// Bytes in flight when the congestion event happened (RecoverFS)
    recover_fs: u64,
    /// Bytes acknowledged since the congestion event (prr_delivered)
    delivered: u64,
    /// Acknowledgements received since the congestion event
    ack_count: u64,
    /// Bytes sent since the congestion event (prr_out)
    sent: u64,
}

impl Prr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a recovery period with `bytes_in_flight` outstanding before the loss
    pub fn on_congestion_event(&mut self, bytes_in_flight: u64) {
        *self = Self {
            recover_fs: bytes_in_flight,
            ..Self::default()
        };
    }

    #[inline]
    pub fn on_packet_sent(&mut self, bytes: u64) {
        self.sent += bytes;
    }

    #[inline]
    pub fn on_ack(&mut self, bytes: u64) {
        self.delivered += bytes;
        self.ack_count += 1;
    }

    /// Returns true if another datagram may be sent during recovery
    pub fn can_send(
        &self,
        congestion_window: u64,
        bytes_in_flight: u64,
        slow_start_threshold: u64,
        max_datagram_size: u64,
    ) -> bool {
        // Limited transmit: the first datagram after the loss always goes out, as
        // does one when the pipe is almost empty.
        if self.sent == 0 || bytes_in_flight < max_datagram_size {
            return true;
        }

        if congestion_window > bytes_in_flight || self.recover_fs == 0 {
            //= https://www.rfc-editor.org/rfc/rfc6937.html#section-3.1
            //# // PRR-SSRB
            //# limit = MAX(prr_delivered - prr_out, DeliveredData) + MSS
            //
            // At most one datagram more than was delivered, for every ack
            let limit = self
                .delivered
                .saturating_add(self.ack_count.saturating_mul(max_datagram_size));
            return limit > self.sent;
        }

        //= https://www.rfc-editor.org/rfc/rfc6937.html#section-3.1
        //# sndcnt = CEIL(prr_delivered * ssthresh / RecoverFS) - prr_out
        //
        // sndcnt > 0, multiplied through by RecoverFS
        let allowed = self.delivered as u128 * slow_start_threshold as u128;
        let sent = self.sent as u128 * self.recover_fs as u128;
        allowed > sent
    }
}
