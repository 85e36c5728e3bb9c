// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The sending side of a station.
//!
//! A [Transmitter] works through a list of [Reservation]s in order. Each
//! reservation is sent as:
//!
//! ```text
//!   control ring: Add ......................................... Remove
//!   data ring:        d0 d1 d2 ... dN
//!                 |<---------- hold_circulations * circulation ---------->|
//! ```
//!
//! The `Remove` is sent a whole number of circulations after the `Add` so
//! that the receiver sees the two in phase. The transmitter then waits for
//! the `Remove` to reach the receiver before starting its next reservation.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use twinring_engine::engine::Engine;
use twinring_engine::executor::Spawner;
use twinring_engine::sim_error;
use twinring_engine::time::clock::Clock;
use twinring_engine::traits::Runnable;
use twinring_engine::types::{SimError, SimResult};
use twinring_track::entity::Entity;
use twinring_track::{debug, info, trace};

use crate::model::Model;
use crate::packet::{Packet, RawPayload};
use crate::types::{ControlCode, NodeId, Priority, RingId, TrafficKind};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reservation {
    pub destination: NodeId,
    pub num_data_packets: usize,
    pub priority: Priority,
    /// Number of ring circulations between the `Add` and the `Remove`.
    pub hold_circulations: u32,
}

impl Reservation {
    #[must_use]
    pub fn new(destination: NodeId, num_data_packets: usize) -> Self {
        Self {
            destination,
            num_data_packets,
            priority: Priority::Low,
            hold_circulations: 1,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_hold_circulations(mut self, hold_circulations: u32) -> Self {
        self.hold_circulations = hold_circulations;
        self
    }
}

pub struct Transmitter {
    pub entity: Rc<Entity>,
    id: NodeId,
    model: Rc<Model>,
    spawner: Spawner,
    control_clock: Clock,
    data_clock: Clock,
    data_ring: RingId,
    reservations: Vec<Reservation>,
    num_reservations_sent: Cell<usize>,
    num_data_sent: Cell<usize>,
}

impl Transmitter {
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        id: NodeId,
        model: &Rc<Model>,
        reservations: Vec<Reservation>,
    ) -> Result<Rc<Self>, SimError> {
        let (Some(node_clock), Some(data_ring)) = (model.node_clock(id), model.data_ring_for(id))
        else {
            return sim_error!(format!("node {id} is not part of the network"));
        };
        let entity = Rc::new(Entity::new(parent, &format!("tx{id}")));
        let control_clock = engine.clock_period_ns(node_clock.cycle_ns(TrafficKind::Control));
        let data_clock = engine.clock_period_ns(node_clock.cycle_ns(TrafficKind::DataTransmit));

        let circulation = model.circulation_time();
        for reservation in &reservations {
            let destination = reservation.destination;
            if destination == id || model.node_clock(destination).is_none() {
                return sim_error!(format!("{entity}: cannot reserve node {destination}"));
            }
            if reservation.hold_circulations == 0 {
                return sim_error!(format!(
                    "{entity}: reservation to {destination} must be held for at least one circulation"
                ));
            }
            let data_ns = (reservation.num_data_packets + 1) as f64 * data_clock.period_ns();
            if data_ns >= f64::from(reservation.hold_circulations) * circulation {
                return sim_error!(format!(
                    "{entity}: {} data packets to {destination} do not fit in {} circulations",
                    reservation.num_data_packets, reservation.hold_circulations
                ));
            }
        }

        let rc_self = Rc::new(Self {
            entity,
            id,
            model: model.clone(),
            spawner: engine.spawner(),
            control_clock,
            data_clock,
            data_ring,
            reservations,
            num_reservations_sent: Cell::new(0),
            num_data_sent: Cell::new(0),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn num_reservations_sent(&self) -> usize {
        self.num_reservations_sent.get()
    }

    #[must_use]
    pub fn num_data_sent(&self) -> usize {
        self.num_data_sent.get()
    }

    fn send_control(&self, reservation: &Reservation, control: ControlCode) -> SimResult {
        let now = self.spawner.time_now_ns();
        let raw = self
            .model
            .generate_packet(self.id, reservation.destination, control)?;
        let packet = Packet::new(&self.entity, raw, self.id, reservation.destination, now)
            .set_priority(reservation.priority);
        trace!(self.entity ; "{} {}", control, packet);
        self.model
            .control_ring()
            .insert_packet(now, packet, self.id, reservation.priority)?;
        Ok(())
    }

    async fn send_data(&self, reservation: &Reservation) -> SimResult {
        let Some(ring) = self.model.data_ring(self.data_ring) else {
            return sim_error!(format!("{}: no data ring {}", self.entity, self.data_ring));
        };
        for seq in 0..reservation.num_data_packets {
            self.data_clock.wait_ticks(1).await;
            let now = self.spawner.time_now_ns();
            let raw = RawPayload::new(format!(
                "data:{}:{}:{seq}",
                self.id, reservation.destination
            ));
            let packet = Packet::new(&self.entity, raw, self.id, reservation.destination, now);
            ring.insert_packet(now, packet, self.id, reservation.priority)?;
            self.num_data_sent.set(self.num_data_sent.get() + 1);
        }
        Ok(())
    }

    async fn send_reservation(&self, reservation: &Reservation) -> SimResult {
        self.control_clock.wait_ticks(1).await;
        let add_sent_ns = self.spawner.time_now_ns();
        self.send_control(reservation, ControlCode::Add)?;

        self.send_data(reservation).await?;

        let remove_ns = add_sent_ns
            + f64::from(reservation.hold_circulations) * self.model.circulation_time();
        let ticks = self.control_clock.ticks_until_ns(remove_ns);
        self.control_clock.wait_ticks(ticks).await;
        self.send_control(reservation, ControlCode::Remove)?;

        self.num_reservations_sent
            .set(self.num_reservations_sent.get() + 1);
        debug!(self.entity ; "reservation to {} complete", reservation.destination);
        Ok(())
    }

    /// Wait until every packet sent so far has reached its destination or
    /// been dropped.
    async fn drain(&self) {
        let drain_ticks = self
            .control_clock
            .ns_to_ticks(self.model.circulation_time())
            .ceil() as u64
            + 1;
        self.control_clock.wait_ticks(drain_ticks).await;
    }
}

#[async_trait(?Send)]
impl Runnable for Transmitter {
    async fn run(&self) -> SimResult {
        for reservation in &self.reservations {
            self.send_reservation(reservation).await?;
            self.drain().await;
        }

        info!(self.entity ; "sent {} reservations, {} data packets",
            self.num_reservations_sent(), self.num_data_sent());
        Ok(())
    }
}
