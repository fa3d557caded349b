// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Estimators consumed by QUIC congestion control: round trip time statistics,
//! bandwidth samples and windowed extremum filters, along with the contract
//! pluggable congestion controllers implement on top of them.

pub mod io;
pub mod packet;
pub mod recovery;
pub mod sync;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
