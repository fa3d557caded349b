// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod bandwidth;
pub mod congestion_controller;
mod hybrid_slow_start;
mod manager;
mod prr;
pub mod reno;
mod rtt_estimator;
mod settings;
mod stats;
pub mod windowed_filter;

pub use bandwidth::Bandwidth;
pub use congestion_controller::{CongestionController, Introspect, PacketEvent, SentPacket};
pub use hybrid_slow_start::HybridSlowStart;
pub use manager::Manager;
pub use prr::Prr;
pub use reno::RenoCongestionController;
pub use rtt_estimator::*;
pub use settings::{Settings, ValidationError};
pub use stats::ConnectionStats;
