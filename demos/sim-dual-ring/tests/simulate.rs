// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use sim_dual_ring::simulate;
use sim_dual_ring::traffic::{TrafficConfig, TrafficPattern};
use twinring_engine::test_helpers::start_test;
use twinring_models::config::TopologyConfig;
use twinring_models::test_helpers::small_network_config;
use twinring_models::types::QueueOperation;

#[test]
fn neighbours_all_delivered() {
    let mut engine = start_test(file!());
    let outcome = simulate(
        &mut engine,
        &TopologyConfig::default(),
        &TrafficConfig::default(),
        None,
    )
    .unwrap();

    let stations = &outcome.stations;
    assert_eq!(stations.num_data_sent(), 4 * 4 * 8);
    assert_eq!(stations.num_data_received(), stations.num_data_sent());
    assert_eq!(stations.num_queued(), 0);
    assert_eq!(outcome.stats.num_errors(), 0);
    assert_eq!(outcome.stats.num_latencies(), 4 * 4 * 8);
    let circulation = outcome.model.circulation_time();
    assert!(
        outcome
            .stats
            .latencies()
            .iter()
            .all(|record| record.latency < circulation)
    );

    for rx in &stations.receivers {
        let added = rx
            .queue_log()
            .iter()
            .filter(|row| row.operation == QueueOperation::Added)
            .count();
        let removed = rx
            .queue_log()
            .iter()
            .filter(|row| row.operation == QueueOperation::Removed)
            .count();
        assert_eq!(added, 4);
        assert_eq!(removed, 4);
    }
}

#[test]
fn random_traffic_has_no_errors() {
    let mut engine = start_test(file!());
    let traffic = TrafficConfig {
        pattern: TrafficPattern::Random,
        reservations_per_node: 6,
        packets_per_reservation: 2,
        high_priority_every: 3,
        seed: 11,
        ..Default::default()
    };
    let outcome = simulate(&mut engine, &small_network_config(), &traffic, None).unwrap();

    assert_eq!(outcome.stats.num_errors(), 0);
    assert_eq!(outcome.stations.num_data_sent(), 4 * 6 * 2);
    assert!(outcome.stations.num_data_received() <= outcome.stations.num_data_sent());

    // Data not read within one circulation is dropped, never delivered late
    let circulation = outcome.model.circulation_time();
    for record in outcome.stats.latencies() {
        assert!(record.latency > 0.0);
        assert!(record.latency < circulation);
    }

    let now = engine.time_now_ns();
    assert_eq!(outcome.model.control_ring().num_in_flight(now), 0);
    for ring_id in 0..outcome.model.num_data_rings() {
        assert_eq!(outcome.model.data_ring(ring_id).unwrap().num_in_flight(now), 0);
    }
}

#[test]
fn horizon_cuts_simulation_short() {
    let mut engine = start_test(file!());
    let outcome = simulate(
        &mut engine,
        &TopologyConfig::default(),
        &TrafficConfig::default(),
        Some(7000.0),
    )
    .unwrap();

    assert_eq!(engine.time_now_ns(), 7000.0);
    assert_eq!(outcome.stats.num_errors(), 0);
    // Only the first round of reservations has been sent
    assert_eq!(outcome.stations.num_data_sent(), 4 * 8);
    assert_eq!(outcome.stations.num_queued(), 4);
}

#[test]
fn invalid_network_reported() {
    let mut engine = start_test(file!());
    let mut config = TopologyConfig::default();
    config.network.num_data_rings = 0;
    assert!(simulate(&mut engine, &config, &TrafficConfig::default(), None).is_err());
}
