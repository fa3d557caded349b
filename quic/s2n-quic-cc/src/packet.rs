// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// A QUIC packet number within a single packet number space
///
/// Packet numbers are assigned in increasing order by the sender, so
/// comparisons between two `PacketNumber`s reflect send order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketNumber(u64);

impl PacketNumber {
    /// Creates a new `PacketNumber` from the given value
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the packet number as a `u64`
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the packet number that follows this one
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for PacketNumber {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}
