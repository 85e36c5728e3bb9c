// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Receivers driven directly by test tasks on the small network, where one
//! circulation takes 5ns.

use std::rc::Rc;

use approx::assert_relative_eq;
use twinring_engine::engine::Engine;
use twinring_engine::run_simulation;
use twinring_engine::test_helpers::start_test;
use twinring_engine::types::SimError;
use twinring_models::model::Model;
use twinring_models::packet::{Packet, RawPayload};
use twinring_models::receiver::{ReceiverEngine, ReceiverFault, ReservationBehaviour};
use twinring_models::ring::RingError;
use twinring_models::stats::{ErrorRecord, StatsCollector};
use twinring_models::test_helpers::small_network;
use twinring_models::types::{ControlCode, NodeId, Priority, QueueOperation};
use twinring_track::entity::Entity;
use twinring_track::id::Unique;

fn build_receiver(engine: &Engine, id: NodeId) -> (Rc<Model>, Rc<StatsCollector>, ReceiverEngine) {
    let model = small_network(engine).unwrap();
    let stats = Rc::new(StatsCollector::new());
    let rx = ReceiverEngine::new(
        engine,
        engine.top(),
        id,
        &model,
        stats.clone(),
        Rc::new(ReservationBehaviour),
    )
    .unwrap();
    (model, stats, rx)
}

fn control_packet(
    model: &Model,
    created_by: &Rc<Entity>,
    source: NodeId,
    destination: NodeId,
    control: ControlCode,
    now: f64,
) -> Result<Packet, SimError> {
    let raw = model.generate_packet(source, destination, control)?;
    Ok(Packet::new(created_by, raw, source, destination, now))
}

fn operations(rx: &ReceiverEngine) -> Vec<(f64, NodeId, QueueOperation)> {
    rx.queue_log()
        .iter()
        .map(|row| (row.timestamp, row.source_id, row.operation))
        .collect()
}

#[test]
fn scenario_a_remove_one_circulation_later() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(10).await;
            let add = control_packet(&model, &top, 1, 3, ControlCode::Add, rx.now())?;
            assert_eq!(rx.ram_queue_input(add, Priority::Low)?, QueueOperation::Added);

            clk.wait_ticks(5).await;
            let remove = control_packet(&model, &top, 1, 3, ControlCode::Remove, rx.now())?;
            let original = rx.get_original_control_packet(&remove).unwrap();
            assert_eq!(original.enqueue_timestamp(), Some(10.0));
            assert_eq!(
                rx.ram_queue_input(remove, Priority::Low)?,
                QueueOperation::Removed
            );
            Ok(())
        });
    }
    run_simulation!(engine);

    assert_eq!(rx.queue_len(), 0);
    assert_eq!(
        operations(&rx),
        vec![
            (10.0, 1, QueueOperation::Added),
            (15.0, 1, QueueOperation::Removed)
        ]
    );
    assert_eq!(stats.num_errors(), 0);
}

#[test]
fn scenario_b_orphan_remove() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(2).await;
            let add = control_packet(&model, &top, 2, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(add, Priority::Low)?;

            clk.wait_ticks(8).await;
            let remove = control_packet(&model, &top, 1, 3, ControlCode::Remove, rx.now())?;
            assert!(rx.get_original_control_packet(&remove).is_none());
            assert_eq!(
                rx.ram_queue_input(remove, Priority::Low)?,
                QueueOperation::Orphaned
            );
            Ok(())
        });
    }
    run_simulation!(engine);

    assert_eq!(rx.queue_len(), 1);
    assert_eq!(rx.queue_head().unwrap().entry_node_id(), 2);
    assert_eq!(
        stats.errors(),
        vec![ErrorRecord {
            source_id: 1,
            destination_id: 3,
            timestamp: 10.0
        }]
    );
    assert_eq!(
        operations(&rx),
        vec![
            (2.0, 2, QueueOperation::Added),
            (10.0, 1, QueueOperation::Orphaned)
        ]
    );
}

#[test]
fn scenario_c_high_priority_jumps_queue() {
    let mut engine = start_test(file!());
    let (model, _stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(1).await;
            let low = control_packet(&model, &top, 2, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(low, Priority::Low)?;

            clk.wait_ticks(1).await;
            let high = control_packet(&model, &top, 9, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(high, Priority::High)?;

            let head = rx.queue_head().unwrap();
            assert_eq!(rx.ram_queue_output(&head)?, 9);
            Ok(())
        });
    }
    run_simulation!(engine);

    let queue: Vec<NodeId> = rx
        .queue_snapshot()
        .iter()
        .map(Packet::entry_node_id)
        .collect();
    assert_eq!(queue, vec![9, 2]);
    assert_eq!(
        operations(&rx),
        vec![
            (1.0, 2, QueueOperation::Added),
            (2.0, 9, QueueOperation::Added),
            (2.0, 9, QueueOperation::Processed)
        ]
    );
}

#[test]
fn queue_conservation() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 0);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            // One reservation from each of three sources, held for one to
            // three circulations
            for source in 1..=3 {
                let add = control_packet(&model, &top, source, 0, ControlCode::Add, rx.now())?;
                rx.ram_queue_input(add, Priority::Low)?;
                clk.wait_ticks(1).await;
            }
            let mut tick = 3;
            for source in 1..=3 {
                let remove_at = u64::from(source - 1 + 5 * source);
                clk.wait_ticks(remove_at - tick).await;
                tick = remove_at;
                let remove =
                    control_packet(&model, &top, source, 0, ControlCode::Remove, rx.now())?;
                assert_eq!(
                    rx.ram_queue_input(remove, Priority::Low)?,
                    QueueOperation::Removed
                );
            }
            Ok(())
        });
    }
    run_simulation!(engine);

    assert_eq!(rx.queue_len(), 0);
    assert_eq!(stats.num_errors(), 0);
    for source in 1..=3 {
        let rows: Vec<QueueOperation> = rx
            .queue_log()
            .iter()
            .filter(|row| row.source_id == source)
            .map(|row| row.operation)
            .collect();
        assert_eq!(rows, vec![QueueOperation::Added, QueueOperation::Removed]);
    }
}

#[test]
fn identical_remove_out_of_phase_not_matched() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(10).await;
            let add = control_packet(&model, &top, 1, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(add, Priority::Low)?;

            // 3ns is not a whole number of circulations
            clk.wait_ticks(3).await;
            let early = control_packet(&model, &top, 1, 3, ControlCode::Remove, rx.now())?;
            assert!(rx.get_original_control_packet(&early).is_none());
            assert_eq!(
                rx.ram_queue_input(early, Priority::Low)?,
                QueueOperation::Orphaned
            );
            assert_eq!(rx.queue_len(), 1);

            // Two circulations after the Add
            clk.wait_ticks(7).await;
            let in_phase = control_packet(&model, &top, 1, 3, ControlCode::Remove, rx.now())?;
            assert!(rx.get_original_control_packet(&in_phase).is_some());
            assert_eq!(
                rx.ram_queue_input(in_phase, Priority::Low)?,
                QueueOperation::Removed
            );
            Ok(())
        });
    }
    run_simulation!(engine);

    assert_eq!(rx.queue_len(), 0);
    assert_eq!(stats.num_errors(), 1);
    assert_relative_eq!(stats.errors()[0].timestamp, 13.0);
}

#[test]
fn unknown_control_code_only_logged() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(4).await;
            let packet = control_packet(&model, &top, 1, 3, ControlCode::Unknown(3), rx.now())?;
            assert_eq!(
                rx.ram_queue_input(packet, Priority::High)?,
                QueueOperation::Unknown
            );

            let garbage = Packet::new(&top, RawPayload::from("01x"), 1, 3, rx.now());
            assert!(matches!(
                rx.ram_queue_input(garbage, Priority::Low),
                Err(ReceiverFault::Codec(_))
            ));
            Ok(())
        });
    }
    run_simulation!(engine);

    assert_eq!(rx.queue_len(), 0);
    assert_eq!(stats.num_errors(), 0);
    assert_eq!(operations(&rx), vec![(4.0, 1, QueueOperation::Unknown)]);
}

#[test]
fn control_id_match() {
    let engine = start_test(file!());
    let (model, _stats, rx) = build_receiver(&engine, 3);
    let top = engine.top();

    let to_me = control_packet(&model, top, 1, 3, ControlCode::Add, 0.0).unwrap();
    let to_other = control_packet(&model, top, 3, 1, ControlCode::Add, 0.0).unwrap();
    let garbage = Packet::new(top, RawPayload::from("1"), 1, 3, 0.0);
    assert!(rx.control_id_match(&to_me));
    assert!(!rx.control_id_match(&to_other));
    assert!(!rx.control_id_match(&garbage));
}

#[test]
fn checks_do_not_mutate() {
    let mut engine = start_test(file!());
    let (model, _stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            let add = control_packet(&model, &top, 1, 3, ControlCode::Add, 0.0)?;
            model.control_ring().insert_packet(0.0, add, 1, Priority::Low)?;
            let data = Packet::new(&top, RawPayload::from("10101010"), 1, 3, 0.0);
            model.data_ring(1).unwrap().insert_packet(0.0, data, 1, Priority::Low)?;

            // Node 1 is 2m before node 3
            clk.wait_ticks(2).await;
            let first = rx.check_control_packet().unwrap();
            let second = rx.check_control_packet().unwrap();
            assert_eq!(first.id(), second.id());
            assert_eq!(first.raw_payload(), second.raw_payload());

            let first = rx.check_data_packet(1).unwrap();
            let second = rx.check_data_packet(1).unwrap();
            assert_eq!(first.id(), second.id());
            assert!(rx.check_data_packet(0).is_none());
            assert!(rx.check_data_packet(7).is_none());

            assert_eq!(model.control_ring().num_in_flight(rx.now()), 1);
            assert_eq!(model.data_ring(1).unwrap().num_in_flight(rx.now()), 1);
            assert_eq!(rx.queue_len(), 0);
            assert!(rx.received_control_log().is_empty());
            Ok(())
        });
    }
    run_simulation!(engine);
}

#[test]
fn latency_is_time_since_generation() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(3).await;
            // Generated before it could be placed on the ring
            let data = Packet::new(&top, RawPayload::from("11110000"), 1, 3, 1.5);
            model.data_ring(1).unwrap().insert_packet(rx.now(), data, 1, Priority::Low)?;

            clk.wait_ticks(2).await;
            let seen = rx.check_data_packet(1).unwrap();
            let received = rx.receive_data_packet(1, &seen)?;
            assert_eq!(received.reception_timestamp(), Some(5.0));
            let latency = rx.record_latency(&received);
            assert_relative_eq!(latency, 3.5);
            assert!(latency >= 0.0);
            Ok(())
        });
    }
    run_simulation!(engine);

    let latencies = stats.latencies();
    assert_eq!(latencies.len(), 1);
    assert_eq!(latencies[0].source_id, 1);
    assert_eq!(latencies[0].destination_id, 3);
    assert_relative_eq!(latencies[0].latency, 3.5);
    let data_log = rx.received_data_log();
    assert_eq!(data_log.len(), 1);
    assert_eq!(data_log[0].source_id, 1);
    assert_relative_eq!(data_log[0].timestamp, 5.0);
}

#[test]
fn receive_faults() {
    let mut engine = start_test(file!());
    let (model, stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        let model = model.clone();
        engine.spawn(async move {
            let add = control_packet(&model, &top, 1, 3, ControlCode::Add, 0.0)?;
            model.control_ring().insert_packet(0.0, add, 1, Priority::Low)?;

            clk.wait_ticks(2).await;
            let seen = rx.check_control_packet().unwrap();

            // Already gone past the node
            clk.wait_ticks(1).await;
            let fault = rx.receive_control_packet(&seen).unwrap_err();
            assert!(matches!(
                fault,
                ReceiverFault::Ring(RingError::NotAdjacent { node: 3, .. })
            ));
            assert!(fault.is_integrity_fault());
            rx.report_fault(&fault, &seen);

            assert_eq!(
                rx.receive_data_packet(5, &seen).unwrap_err(),
                ReceiverFault::UnknownDataRing(5)
            );
            Ok(())
        });
    }
    run_simulation!(engine);

    assert_eq!(stats.num_errors(), 1);
    assert!(rx.received_control_log().is_empty());
    assert_eq!(model.control_ring().num_in_flight(engine.time_now_ns()), 1);
}

#[test]
fn receive_control_packet_logged() {
    let mut engine = start_test(file!());
    let (model, _stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        let model = model.clone();
        engine.spawn(async move {
            let add = control_packet(&model, &top, 1, 3, ControlCode::Add, 0.0)?;
            model.control_ring().insert_packet(0.0, add, 1, Priority::Low)?;

            clk.wait_ticks(2).await;
            let seen = rx.check_control_packet().unwrap();
            let received = rx.receive_control_packet(&seen)?;
            assert_eq!(received.reception_timestamp(), Some(2.0));
            assert!(rx.check_control_packet().is_none());
            Ok(())
        });
    }
    run_simulation!(engine);

    let log = rx.received_control_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].source_id, 1);
    assert_eq!(log[0].timestamp, 2.0);
    assert_eq!(model.control_ring().num_in_flight(engine.time_now_ns()), 0);
}

#[test]
fn listening_ring_follows_head() {
    let mut engine = start_test(file!());
    let (model, _stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            assert!(rx.listening_ring().is_none());

            clk.wait_ticks(1).await;
            let add = control_packet(&model, &top, 1, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(add, Priority::Low)?;
            rx.update_listening_ring()?;
            assert_eq!(rx.listening_ring(), Some(1));

            let add = control_packet(&model, &top, 2, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(add, Priority::Low)?;
            // Head unchanged so no new Processed row
            rx.update_listening_ring()?;
            assert_eq!(rx.listening_ring(), Some(1));

            clk.wait_ticks(5).await;
            let remove = control_packet(&model, &top, 1, 3, ControlCode::Remove, rx.now())?;
            rx.ram_queue_input(remove, Priority::Low)?;
            rx.update_listening_ring()?;
            assert_eq!(rx.listening_ring(), Some(0));

            let remove = control_packet(&model, &top, 2, 3, ControlCode::Remove, rx.now())?;
            rx.ram_queue_input(remove, Priority::Low)?;
            rx.update_listening_ring()?;
            assert!(rx.listening_ring().is_none());
            Ok(())
        });
    }
    run_simulation!(engine);

    let processed: Vec<(f64, NodeId)> = rx
        .queue_log()
        .iter()
        .filter(|row| row.operation == QueueOperation::Processed)
        .map(|row| (row.timestamp, row.source_id))
        .collect();
    assert_eq!(processed, vec![(1.0, 1), (6.0, 2)]);
}

#[test]
fn head_from_unknown_source_stops_listening() {
    let mut engine = start_test(file!());
    let (model, _stats, rx) = build_receiver(&engine, 3);
    let clk = engine.clock_period_ns(1.0);
    let top = engine.top().clone();
    {
        let rx = rx.clone();
        engine.spawn(async move {
            clk.wait_ticks(1).await;
            let add = control_packet(&model, &top, 2, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(add, Priority::Low)?;
            rx.update_listening_ring()?;
            assert_eq!(rx.listening_ring(), Some(0));

            // Node 9 can be addressed but is not part of the network
            let add = control_packet(&model, &top, 9, 3, ControlCode::Add, rx.now())?;
            rx.ram_queue_input(add, Priority::High)?;
            assert_eq!(
                rx.update_listening_ring(),
                Err(ReceiverFault::UnknownSource(9))
            );
            assert!(rx.listening_ring().is_none());

            // Not reported again while the head is unchanged
            rx.update_listening_ring()?;
            assert!(rx.listening_ring().is_none());

            clk.wait_ticks(5).await;
            let remove = control_packet(&model, &top, 9, 3, ControlCode::Remove, rx.now())?;
            assert_eq!(
                rx.ram_queue_input(remove, Priority::High)?,
                QueueOperation::Removed
            );
            rx.update_listening_ring()?;
            assert_eq!(rx.listening_ring(), Some(0));
            Ok(())
        });
    }
    run_simulation!(engine);

    let processed: Vec<(f64, NodeId)> = rx
        .queue_log()
        .iter()
        .filter(|row| row.operation == QueueOperation::Processed)
        .map(|row| (row.timestamp, row.source_id))
        .collect();
    assert_eq!(processed, vec![(1.0, 2), (1.0, 9), (6.0, 2)]);
}

#[test]
fn unknown_node_rejected() {
    let engine = start_test(file!());
    let model = small_network(&engine).unwrap();
    let result = ReceiverEngine::new(
        &engine,
        engine.top(),
        42,
        &model,
        Rc::new(StatsCollector::new()),
        Rc::new(ReservationBehaviour),
    );
    assert!(result.is_err());
}
