// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The polling loops run by a receiver.
//!
//! Both loops wake once per cycle of their clock and run until the end of
//! the simulation. They are background work: a simulation with only
//! receiver loops left will finish.
//!
//! Each wake reads every addressed packet that is passing the station, as a
//! packet left on the ring is dropped before it comes round again.

use async_trait::async_trait;
use twinring_engine::types::SimResult;
use twinring_track::trace;

use super::ReceiverEngine;

#[async_trait(?Send)]
pub trait StationBehaviour {
    /// Poll the control ring for reservations addressed to the station.
    async fn receive_on_control_ring(&self, rx: &ReceiverEngine) -> SimResult;

    /// Poll the selected data ring for payload addressed to the station.
    async fn receive_on_data_ring(&self, rx: &ReceiverEngine) -> SimResult;
}

/// The standard station: one reservation is served at a time, in queue
/// order, with high priority reservations jumping the queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReservationBehaviour;

impl ReservationBehaviour {
    /// Read one control packet. Returns whether a packet was taken off the
    /// ring.
    fn handle_control(rx: &ReceiverEngine) -> bool {
        let Some(packet) = rx.check_control_packet() else {
            return false;
        };
        if !rx.control_id_match(&packet) {
            trace!(rx.entity ; "ignoring {}", packet);
            return false;
        }

        let received = match rx.receive_control_packet(&packet) {
            Ok(received) => received,
            Err(fault) => {
                rx.report_fault(&fault, &packet);
                return false;
            }
        };
        let priority = received.priority();
        if let Err(fault) = rx.ram_queue_input(received, priority) {
            rx.report_fault(&fault, &packet);
        }
        true
    }

    fn select_data_ring(rx: &ReceiverEngine) {
        if let Err(fault) = rx.update_listening_ring() {
            if let Some(head) = rx.queue_head() {
                rx.report_fault(&fault, &head);
            }
        }
    }

    /// Read one data packet. Returns whether a packet was taken off the ring.
    fn handle_data(rx: &ReceiverEngine) -> bool {
        let Some(ring_id) = rx.listening_ring() else {
            return false;
        };
        let Some(packet) = rx.check_data_packet(ring_id) else {
            return false;
        };
        match rx.receive_data_packet(ring_id, &packet) {
            Ok(received) => {
                let latency = rx.record_latency(&received);
                trace!(rx.entity ; "latency {:.1}ns for {}", latency, received);
                true
            }
            Err(fault) => {
                rx.report_fault(&fault, &packet);
                false
            }
        }
    }
}

#[async_trait(?Send)]
impl StationBehaviour for ReservationBehaviour {
    async fn receive_on_control_ring(&self, rx: &ReceiverEngine) -> SimResult {
        loop {
            rx.control_clock().wait_ticks_or_exit(1).await;
            while Self::handle_control(rx) {}
            Self::select_data_ring(rx);
        }
    }

    async fn receive_on_data_ring(&self, rx: &ReceiverEngine) -> SimResult {
        loop {
            rx.data_clock().wait_ticks_or_exit(1).await;
            while Self::handle_data(rx) {}
        }
    }
}
