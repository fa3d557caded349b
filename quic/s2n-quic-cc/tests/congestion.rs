// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use s2n_quic_cc::{
    packet::PacketNumber,
    recovery::{
        Bandwidth, CongestionController, Manager, RenoCongestionController, RttEstimator,
        Settings, INFINITE_DURATION,
    },
    time::{Clock, StdClock, Timestamp},
};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::Instant,
};
use tracing_subscriber::EnvFilter;

const PROPAGATION_DELAY: Duration = Duration::from_millis(40);
const TICK: Duration = Duration::from_millis(1);
/// Packets the bottleneck forwards per tick
const LINK_PACKETS_PER_TICK: usize = 10;
const QUEUE_LIMIT: usize = 100;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A single bottleneck link with a drop-tail queue
struct Network<CC> {
    manager: Manager<CC>,
    packet_size: u64,
    now: Timestamp,
    next_packet_number: PacketNumber,
    queue: VecDeque<PacketNumber>,
    acks: VecDeque<(Timestamp, PacketNumber)>,
    losses: VecDeque<(Timestamp, PacketNumber)>,
    bytes_in_network: u64,
    dropped: usize,
}

impl<CC: CongestionController> Network<CC> {
    fn new(manager: Manager<CC>, packet_size: u64) -> Self {
        Self {
            manager,
            packet_size,
            now: Timestamp::from_duration(Duration::from_secs(1)),
            next_packet_number: PacketNumber::new(0),
            queue: VecDeque::new(),
            acks: VecDeque::new(),
            losses: VecDeque::new(),
            bytes_in_network: 0,
            dropped: 0,
        }
    }

    fn link_rate(&self) -> Bandwidth {
        Bandwidth::new(LINK_PACKETS_PER_TICK as u64 * self.packet_size, TICK)
    }

    fn tick(&mut self) {
        let now = self.now;

        while let Some((_, packet_number)) = self.acks.front().filter(|(at, _)| *at <= now) {
            let packet_number = *packet_number;
            self.acks.pop_front();
            self.bytes_in_network -= self.packet_size;
            self.manager
                .on_ack_received([packet_number], Duration::ZERO, now);
        }

        while let Some((_, packet_number)) = self.losses.front().filter(|(at, _)| *at <= now) {
            let packet_number = *packet_number;
            self.losses.pop_front();
            self.bytes_in_network -= self.packet_size;
            self.manager.on_packet_lost(packet_number, now);
        }

        while self.manager.time_until_send() != INFINITE_DURATION {
            let packet_number = self.next_packet_number;
            self.next_packet_number = packet_number.next();
            self.manager
                .on_packet_sent(packet_number, self.packet_size, true, false, now);
            self.bytes_in_network += self.packet_size;

            if self.queue.len() < QUEUE_LIMIT {
                self.queue.push_back(packet_number);
            } else {
                // the loss is noticed once later packets are acknowledged
                self.dropped += 1;
                self.losses.push_back((now + PROPAGATION_DELAY, packet_number));
            }
        }

        for _ in 0..LINK_PACKETS_PER_TICK {
            let Some(packet_number) = self.queue.pop_front() else {
                break;
            };
            self.acks.push_back((now + PROPAGATION_DELAY, packet_number));
        }

        self.now += TICK;
    }

    fn run(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.tick();
        }
    }
}

#[test]
fn reno_converges_on_a_bottleneck() {
    init_tracing();

    let settings = Settings::default();
    let packet_size = settings.max_datagram_size() as u64;
    let rtt_estimator = Arc::new(RttEstimator::new());
    let cc = RenoCongestionController::new(rtt_estimator.clone(), settings);
    let mut network = Network::new(Manager::new(rtt_estimator, cc), packet_size);

    network.run(Duration::from_secs(3));

    let manager = &network.manager;
    let cc = manager.congestion_controller();

    assert!(network.dropped > 0);
    assert_eq!(manager.bytes_in_flight(), network.bytes_in_network);
    assert_eq!(manager.rtt_estimator().min_rtt(), PROPAGATION_DELAY);

    // the queue overflowed, so slow start must have ended
    assert!(!cc.in_slow_start());
    assert!(cc.congestion_window() >= settings.min_window());
    assert!(cc.congestion_window() < settings.max_window());

    let link_rate = network.link_rate();
    let estimate = cc.bandwidth_estimate();
    assert!(estimate <= link_rate, "{estimate} > {link_rate}");
    assert!(
        estimate.as_bits_per_second() > link_rate.as_bits_per_second() / 2,
        "{estimate} is too far below {link_rate}"
    );
}

#[test]
fn migration_restarts_a_boxed_controller() {
    init_tracing();

    let settings = Settings::default();
    let packet_size = settings.max_datagram_size() as u64;
    let rtt_estimator = Arc::new(RttEstimator::new());
    let cc: Box<dyn CongestionController> = Box::new(RenoCongestionController::new(
        rtt_estimator.clone(),
        settings,
    ));
    let mut network = Network::new(Manager::new(rtt_estimator, cc), packet_size);

    network.run(Duration::from_millis(200));
    assert!(network.manager.congestion_controller().congestion_window() > settings.initial_window());

    network.manager.on_connection_migration();

    let manager = &network.manager;
    let cc = manager.congestion_controller();
    assert_eq!(cc.congestion_window(), settings.initial_window());
    assert_eq!(manager.bytes_in_flight(), 0);
    assert_eq!(manager.rtt_estimator().smoothed_rtt(), Duration::ZERO);

    let introspect = cc.introspect().expect("reno supports introspection");
    assert!(!introspect.in_recovery());
    assert_eq!(introspect.slow_start_threshold(), settings.max_window());
    assert!(!introspect.hybrid_slow_start().started());
}

#[test]
#[cfg_attr(miri, ignore)]
fn wall_clock_round_trip() {
    init_tracing();

    let epoch = Instant::now()
        .checked_sub(Duration::from_secs(1))
        .unwrap_or_else(Instant::now);
    let clock = StdClock::new(epoch);
    let rtt_estimator = Arc::new(RttEstimator::new());
    let cc = RenoCongestionController::new(rtt_estimator.clone(), Settings::default());
    let mut manager = Manager::new(rtt_estimator, cc);

    let packet_number = PacketNumber::new(0);
    manager.on_packet_sent(packet_number, 1200, true, false, clock.get_time());
    std::thread::sleep(Duration::from_millis(10));
    manager.on_ack_received([packet_number], Duration::ZERO, clock.get_time());

    let rtt = manager.rtt_estimator();
    assert!(rtt.latest_rtt() >= Duration::from_millis(10));
    assert_eq!(rtt.min_rtt(), rtt.latest_rtt());
    assert_eq!(rtt.smoothed_rtt(), rtt.latest_rtt());
    assert_eq!(manager.bytes_in_flight(), 0);
    assert!(manager.congestion_controller().bandwidth_estimate() > Bandwidth::ZERO);
}
