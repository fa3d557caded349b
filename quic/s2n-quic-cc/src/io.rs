// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The boundary with the datagram transport underneath a connection
//!
//! Only the parts of the transport that influence congestion control are
//! modeled here: addressing and the per-datagram space reserved for an
//! outer envelope, which shrinks the largest QUIC packet that can be sent.

use std::net::SocketAddr;

/// A transport capability reserving bytes in every datagram for an envelope
/// that wraps the QUIC packet
pub trait EnvelopeSize {
    /// The number of bytes reserved in each datagram
    fn envelope_size(&self) -> u16;
}

/// A datagram transport bound to a single peer
pub trait PacketConn {
    fn local_address(&self) -> SocketAddr;

    fn remote_address(&self) -> SocketAddr;

    /// Returns the envelope capability if the transport supports one
    ///
    /// Transports without an envelope keep the default, which reserves nothing.
    #[inline]
    fn envelope(&self) -> Option<&dyn EnvelopeSize> {
        None
    }
}

/// Returns the number of bytes `conn` reserves in each datagram, or zero if
/// the transport does not expose an [`EnvelopeSize`] capability
#[inline]
pub fn envelope_size<C: PacketConn + ?Sized>(conn: &C) -> u16 {
    conn.envelope()
        .map_or(0, |envelope| envelope.envelope_size())
}

/// Returns the space left for a QUIC packet in a datagram of
/// `max_udp_payload` bytes sent over `conn`
#[inline]
pub fn max_datagram_size<C: PacketConn + ?Sized>(conn: &C, max_udp_payload: u16) -> u16 {
    max_udp_payload.saturating_sub(envelope_size(conn))
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    /// A fixed-size envelope reservation
    #[derive(Clone, Copy, Debug)]
    pub struct Envelope(pub u16);

    impl EnvelopeSize for Envelope {
        fn envelope_size(&self) -> u16 {
            self.0
        }
    }

    /// A connection between two fixed loopback addresses
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Conn {
        pub envelope: Option<Envelope>,
    }

    impl Conn {
        pub fn with_envelope(envelope_size: u16) -> Self {
            Self {
                envelope: Some(Envelope(envelope_size)),
            }
        }
    }

    impl PacketConn for Conn {
        fn local_address(&self) -> SocketAddr {
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4433).into()
        }

        fn remote_address(&self) -> SocketAddr {
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4434).into()
        }

        fn envelope(&self) -> Option<&dyn EnvelopeSize> {
            self.envelope
                .as_ref()
                .map(|envelope| envelope as &dyn EnvelopeSize)
        }
    }
}
