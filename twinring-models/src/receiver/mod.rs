// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The receiving side of a station.
//!
//! A [ReceiverEngine] listens to the control ring for reservations addressed
//! to its station and keeps them in a RAM queue. The reservation at the head
//! of the queue decides which data ring the station listens to for payload.
//!
//! ```text
//!                    +-------------------------------------+
//!  control ring ---> | control loop -> RAM queue -> head   |
//!                    |                               |     |
//!                    |                   selects data ring |
//!                    |                               v     |
//!  data rings -----> | data loop ----------> latency log   |
//!                    +-------------------------------------+
//! ```
//!
//! What the two loops do is decided by a [StationBehaviour] so that
//! different station variants can reuse the same queue and logs.
//!
//! A `Remove` only releases an `Add` with the same source and destination
//! which was queued a whole number of ring circulations earlier. Packets
//! that are identical but out of phase belong to a different reservation.

pub mod behaviour;
pub mod fault;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use twinring_engine::engine::Engine;
use twinring_engine::executor::Spawner;
use twinring_engine::sim_error;
use twinring_engine::time::clock::Clock;
use twinring_engine::traits::Runnable;
use twinring_engine::types::{SimError, SimResult};
use twinring_track::entity::Entity;
use twinring_track::id::Unique;
use twinring_track::{Id, debug, info, trace, warn};

pub use self::behaviour::{ReservationBehaviour, StationBehaviour};
pub use self::fault::ReceiverFault;
use crate::model::Model;
use crate::packet::{Packet, RawPayload};
use crate::stats::{ErrorRecord, LatencyRecord, StatsSink};
use crate::types::{ControlCode, NodeId, Priority, QueueOperation, RingId, TrafficKind};

/// Largest difference (in ns) between a reservation's age and a whole
/// number of circulations that still counts as in phase.
pub const PHASE_TOLERANCE_NS: f64 = 1e-6;

/// One row of the queue log.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueLogEntry {
    pub timestamp: f64,
    pub raw_packet: RawPayload,
    pub source_id: NodeId,
    pub operation: QueueOperation,
}

/// One row of the received control / data logs.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedLogEntry {
    pub timestamp: f64,
    pub raw_packet: RawPayload,
    pub source_id: NodeId,
}

#[derive(Default)]
struct ReceiverState {
    queue: RefCell<VecDeque<Packet>>,
    queue_log: RefCell<Vec<QueueLogEntry>>,
    received_control_log: RefCell<Vec<ReceivedLogEntry>>,
    received_data_log: RefCell<Vec<ReceivedLogEntry>>,
    listening_ring: Cell<Option<RingId>>,

    /// The queue head for which the listening ring was last chosen.
    selected_head: Cell<Option<Id>>,
}

/// The receiver of one station.
///
/// Cloning gives another handle to the same receiver so that each polling
/// loop can own one.
#[derive(Clone)]
pub struct ReceiverEngine {
    pub entity: Rc<Entity>,
    id: NodeId,
    model: Rc<Model>,
    stats: Rc<dyn StatsSink>,
    spawner: Spawner,
    control_clock: Clock,
    data_clock: Clock,
    behaviour: Rc<dyn StationBehaviour>,
    state: Rc<ReceiverState>,
}

impl ReceiverEngine {
    /// Create a receiver that is not started by the engine. Its loops can be
    /// started by calling [ReceiverEngine::initialise].
    pub fn new(
        engine: &Engine,
        parent: &Rc<Entity>,
        id: NodeId,
        model: &Rc<Model>,
        stats: Rc<dyn StatsSink>,
        behaviour: Rc<dyn StationBehaviour>,
    ) -> Result<Self, SimError> {
        let Some(node_clock) = model.node_clock(id) else {
            return sim_error!(format!("node {id} is not part of the network"));
        };
        let entity = Rc::new(Entity::new(parent, &format!("rx{id}")));
        let control_clock = engine.clock_period_ns(node_clock.cycle_ns(TrafficKind::Control));
        let data_clock = engine.clock_period_ns(node_clock.cycle_ns(TrafficKind::DataReceive));

        Ok(Self {
            entity,
            id,
            model: model.clone(),
            stats,
            spawner: engine.spawner(),
            control_clock,
            data_clock,
            behaviour,
            state: Rc::new(ReceiverState::default()),
        })
    }

    /// Create a receiver whose loops start when the simulation starts.
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        id: NodeId,
        model: &Rc<Model>,
        stats: Rc<dyn StatsSink>,
        behaviour: Rc<dyn StationBehaviour>,
    ) -> Result<Rc<Self>, SimError> {
        let rc_self = Rc::new(Self::new(engine, parent, id, model, stats, behaviour)?);
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    /// Start the control and data loops as two independent tasks.
    pub fn initialise(&self) {
        trace!(self.entity ; "starting control and data loops");
        let rx = self.clone();
        self.spawner
            .spawn(async move { rx.behaviour.receive_on_control_ring(&rx).await });
        let rx = self.clone();
        self.spawner
            .spawn(async move { rx.behaviour.receive_on_data_ring(&rx).await });
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn model(&self) -> &Rc<Model> {
        &self.model
    }

    #[must_use]
    pub fn control_clock(&self) -> &Clock {
        &self.control_clock
    }

    #[must_use]
    pub fn data_clock(&self) -> &Clock {
        &self.data_clock
    }

    #[must_use]
    pub fn now(&self) -> f64 {
        self.spawner.time_now_ns()
    }

    /// Whether a control packet is addressed to this station.
    #[must_use]
    pub fn control_id_match(&self, packet: &Packet) -> bool {
        self.model
            .interpret_control_packet(packet.raw_payload())
            .is_ok_and(|triple| triple.destination == self.id)
    }

    /// Apply a received control packet to the RAM queue.
    ///
    /// Every control code appends exactly one row to the queue log. Only a
    /// packet which cannot be decoded is returned as an error.
    pub fn ram_queue_input(
        &self,
        mut packet: Packet,
        priority: Priority,
    ) -> Result<QueueOperation, ReceiverFault> {
        let now = self.now();
        let triple = self.model.interpret_control_packet(packet.raw_payload())?;
        let raw_packet = packet.raw_payload().clone();

        let operation = match triple.control {
            ControlCode::Add => {
                packet.set_enqueue_timestamp(now);
                let mut queue = self.state.queue.borrow_mut();
                match priority {
                    Priority::High => queue.push_front(packet),
                    Priority::Low => queue.push_back(packet),
                }
                debug!(self.entity ; "queued reservation from {} ({priority}), {} queued",
                    triple.source, queue.len());
                QueueOperation::Added
            }
            ControlCode::Remove => match self.get_original_control_packet(&packet) {
                Some(original) => {
                    let mut queue = self.state.queue.borrow_mut();
                    queue.retain(|queued| queued.id() != original.id());
                    debug!(self.entity ; "released reservation from {}, {} queued",
                        triple.source, queue.len());
                    QueueOperation::Removed
                }
                None => {
                    let fault = ReceiverFault::OrphanRemove {
                        source: triple.source,
                        destination: triple.destination,
                    };
                    self.report_fault(&fault, &packet);
                    QueueOperation::Orphaned
                }
            },
            ControlCode::Unknown(code) => {
                let fault = ReceiverFault::UnknownControlCode {
                    source: triple.source,
                    code,
                };
                self.report_fault(&fault, &packet);
                QueueOperation::Unknown
            }
        };

        self.log_queue_operation(now, raw_packet, triple.source, operation);
        Ok(operation)
    }

    /// Find the queued `Add` that a `Remove` releases.
    ///
    /// The `Add` must have the same source and destination, and have been
    /// queued a whole number of circulations before now.
    #[must_use]
    pub fn get_original_control_packet(&self, packet: &Packet) -> Option<Packet> {
        let triple = self
            .model
            .interpret_control_packet(packet.raw_payload())
            .ok()?;
        let signature = self
            .model
            .generate_packet(triple.source, triple.destination, ControlCode::Add)
            .ok()?;
        let circulation = self.model.circulation_time();
        let now = self.now();

        self.state
            .queue
            .borrow()
            .iter()
            .find(|queued| {
                queued.raw_payload() == &signature
                    && queued
                        .enqueue_timestamp()
                        .is_some_and(|enqueued| is_in_phase(now - enqueued, circulation))
            })
            .cloned()
    }

    /// Report the source of the reservation at the head of the queue.
    ///
    /// The queue itself is not changed.
    pub fn ram_queue_output(&self, packet: &Packet) -> Result<NodeId, ReceiverFault> {
        let triple = self.model.interpret_control_packet(packet.raw_payload())?;
        debug!(self.entity ; "processing reservation from {}", triple.source);
        self.log_queue_operation(
            self.now(),
            packet.raw_payload().clone(),
            triple.source,
            QueueOperation::Processed,
        );
        Ok(triple.source)
    }

    /// Choose the data ring to listen to if the head of the queue has changed
    /// since the last call.
    ///
    /// If the ring of the new head cannot be found the station stops
    /// listening until the head changes again.
    pub fn update_listening_ring(&self) -> Result<(), ReceiverFault> {
        let head = self.queue_head();
        let head_id = head.as_ref().map(Unique::id);
        if head_id == self.state.selected_head.get() {
            return Ok(());
        }
        self.state.selected_head.set(head_id);

        let selected = match head {
            Some(head) => self.ring_for_head(&head).map(Some),
            None => Ok(None),
        };
        let ring_id = selected.as_ref().ok().copied().flatten();
        trace!(self.entity ; "listening to data ring {:?}", ring_id);
        self.state.listening_ring.set(ring_id);
        selected.map(|_| ())
    }

    fn ring_for_head(&self, head: &Packet) -> Result<RingId, ReceiverFault> {
        let source = self.ram_queue_output(head)?;
        self.model
            .data_ring_for(source)
            .ok_or(ReceiverFault::UnknownSource(source))
    }

    /// Take a control packet addressed to this station off the control ring.
    pub fn receive_control_packet(&self, packet: &Packet) -> Result<Packet, ReceiverFault> {
        let now = self.now();
        let received = self
            .model
            .control_ring()
            .remove_packet(self.id, packet, now)?;
        trace!(self.entity ; "received control {}", received);
        self.state
            .received_control_log
            .borrow_mut()
            .push(ReceivedLogEntry {
                timestamp: now,
                raw_packet: received.raw_payload().clone(),
                source_id: received.entry_node_id(),
            });
        Ok(received)
    }

    /// Take a data packet off a data ring.
    pub fn receive_data_packet(
        &self,
        ring_id: RingId,
        packet: &Packet,
    ) -> Result<Packet, ReceiverFault> {
        let now = self.now();
        let ring = self
            .model
            .data_ring(ring_id)
            .ok_or(ReceiverFault::UnknownDataRing(ring_id))?;
        let received = ring.remove_packet(self.id, packet, now)?;
        trace!(self.entity ; "received data {} from ring {}", received, ring_id);
        self.state.received_data_log.borrow_mut().push(ReceivedLogEntry {
            timestamp: now,
            raw_packet: received.raw_payload().clone(),
            source_id: received.entry_node_id(),
        });
        Ok(received)
    }

    #[must_use]
    pub fn check_control_packet(&self) -> Option<Packet> {
        self.model.control_ring().check_packet(self.now(), self.id)
    }

    #[must_use]
    pub fn check_data_packet(&self, ring_id: RingId) -> Option<Packet> {
        self.model
            .data_ring(ring_id)?
            .check_packet(self.now(), self.id)
    }

    /// Record the time from generation to now. Returns the latency.
    pub fn record_latency(&self, packet: &Packet) -> f64 {
        let latency = self.now() - packet.generation_timestamp();
        self.stats.record_latency(LatencyRecord {
            source_id: packet.entry_node_id(),
            destination_id: packet.destination_node_id(),
            latency,
        });
        latency
    }

    pub fn record_error(&self, packet: &Packet) {
        self.stats.record_error(ErrorRecord {
            source_id: packet.entry_node_id(),
            destination_id: packet.destination_node_id(),
            timestamp: self.now(),
        });
    }

    /// Log a fault. Integrity faults are also recorded as network errors.
    pub fn report_fault(&self, fault: &ReceiverFault, packet: &Packet) {
        if fault.is_integrity_fault() {
            warn!(self.entity ; "{fault}: dropping {packet}");
            self.record_error(packet);
        } else {
            info!(self.entity ; "{fault}");
        }
    }

    fn log_queue_operation(
        &self,
        timestamp: f64,
        raw_packet: RawPayload,
        source_id: NodeId,
        operation: QueueOperation,
    ) {
        self.state.queue_log.borrow_mut().push(QueueLogEntry {
            timestamp,
            raw_packet,
            source_id,
            operation,
        });
    }

    #[must_use]
    pub fn queue_head(&self) -> Option<Packet> {
        self.state.queue.borrow().front().cloned()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.queue.borrow().len()
    }

    #[must_use]
    pub fn queue_snapshot(&self) -> Vec<Packet> {
        self.state.queue.borrow().iter().cloned().collect()
    }

    #[must_use]
    pub fn queue_log(&self) -> Vec<QueueLogEntry> {
        self.state.queue_log.borrow().clone()
    }

    #[must_use]
    pub fn received_control_log(&self) -> Vec<ReceivedLogEntry> {
        self.state.received_control_log.borrow().clone()
    }

    #[must_use]
    pub fn received_data_log(&self) -> Vec<ReceivedLogEntry> {
        self.state.received_data_log.borrow().clone()
    }

    /// The data ring the data loop is listening to, if any.
    #[must_use]
    pub fn listening_ring(&self) -> Option<RingId> {
        self.state.listening_ring.get()
    }
}

#[async_trait(?Send)]
impl Runnable for ReceiverEngine {
    async fn run(&self) -> SimResult {
        self.initialise();
        Ok(())
    }
}

/// Whether `age` is a whole number of circulations.
fn is_in_phase(age: f64, circulation: f64) -> bool {
    if age < -PHASE_TOLERANCE_NS {
        return false;
    }
    let circulations = (age / circulation).round();
    (age - circulations * circulation).abs() <= PHASE_TOLERANCE_NS
}
