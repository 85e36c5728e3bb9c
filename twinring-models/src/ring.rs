// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A shared circular medium.
//!
//! Packets are placed on the ring at the position of the node inserting them
//! and then travel at a fixed speed, wrapping around the ring, until a node
//! removes them. A packet that gets back to where it was inserted without
//! being removed is dropped. A packet can be read by a node while it is within one slot
//! of having passed that node's position:
//!
//! ```text
//!             node
//!              |<-- speed * slot_ns -->|
//!   -----------+=======================+------------> direction of travel
//!              ^ packet adjacent while its position is in this window
//! ```
//!
//! The ring is only accessed from simulation tasks which run one at a time,
//! so each operation completes before any other task can see the ring.

use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use twinring_engine::types::SimError;
use twinring_track::entity::Entity;
use twinring_track::id::Unique;
use twinring_track::{Id, enter, exit, trace};

use crate::packet::Packet;
use crate::types::{NodeId, Priority};

/// Distance (in metres) below which two ring positions are the same.
const POSITION_TOLERANCE: f64 = 1e-6;

/// Time (in ns) below which two times are the same.
const TIME_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub enum RingError {
    UnknownNode { ring: String, node: NodeId },
    /// The packet is not in flight on this ring.
    NotOnRing { ring: String, packet: Id },
    /// The packet is on the ring but not passing the node.
    NotAdjacent {
        ring: String,
        node: NodeId,
        packet: Id,
    },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RingError::UnknownNode { ring, node } => write!(f, "{ring}: no node {node}"),
            RingError::NotOnRing { ring, packet } => {
                write!(f, "{ring}: packet {packet} is not on the ring")
            }
            RingError::NotAdjacent { ring, node, packet } => {
                write!(f, "{ring}: packet {packet} is not passing node {node}")
            }
        }
    }
}

impl Error for RingError {}

impl From<RingError> for SimError {
    fn from(e: RingError) -> Self {
        SimError(e.to_string())
    }
}

pub struct Ring {
    pub entity: Rc<Entity>,
    length: f64,
    speed: f64,
    slot_ns: f64,
    node_positions: HashMap<NodeId, f64>,

    /// Packets in flight, in the order in which they are checked.
    in_flight: RefCell<Vec<Packet>>,
}

impl Ring {
    /// Create a ring of `length` metres on which packets travel at `speed`
    /// metres per ns.
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        length: f64,
        speed: f64,
        slot_ns: f64,
        node_positions: &[(NodeId, f64)],
    ) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            length,
            speed,
            slot_ns,
            node_positions: node_positions.iter().copied().collect(),
            in_flight: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub fn slot_ns(&self) -> f64 {
        self.slot_ns
    }

    /// Time taken for a packet to travel once around the ring.
    #[must_use]
    pub fn circulation_time(&self) -> f64 {
        self.length / self.speed
    }

    #[must_use]
    pub fn node_position(&self, node_id: NodeId) -> Option<f64> {
        self.node_positions.get(&node_id).copied()
    }

    /// Number of packets still in flight at time `now`.
    #[must_use]
    pub fn num_in_flight(&self, now: f64) -> usize {
        self.in_flight
            .borrow()
            .iter()
            .filter(|packet| !self.is_expired(packet, now))
            .count()
    }

    /// A packet has expired once it has been all the way around the ring.
    fn is_expired(&self, packet: &Packet, now: f64) -> bool {
        now - packet.transmission_timestamp() >= self.circulation_time() - TIME_TOLERANCE
    }

    fn drop_expired(&self, in_flight: &mut Vec<Packet>, now: f64) {
        in_flight.retain(|packet| {
            if self.is_expired(packet, now) {
                trace!(self.entity ; "drop {} after a full circulation", packet);
                exit!(self.entity ; packet.id());
                false
            } else {
                true
            }
        });
    }

    /// Position of a packet on the ring at time `now`.
    #[must_use]
    pub fn position_of(&self, packet: &Packet, now: f64) -> f64 {
        let travelled = (now - packet.transmission_timestamp()) * self.speed;
        (packet.entry_point() + travelled).rem_euclid(self.length)
    }

    /// How far the packet has travelled beyond the node position.
    fn offset_past(&self, packet: &Packet, node_position: f64, now: f64) -> f64 {
        let offset = (self.position_of(packet, now) - node_position).rem_euclid(self.length);
        if self.length - offset <= POSITION_TOLERANCE {
            // Rounding has placed the packet just short of the node
            offset - self.length
        } else {
            offset
        }
    }

    fn is_adjacent(&self, packet: &Packet, node_position: f64, now: f64) -> bool {
        let offset = self.offset_past(packet, node_position, now);
        offset >= -POSITION_TOLERANCE && offset < self.speed * self.slot_ns - POSITION_TOLERANCE
    }

    fn position_or_err(&self, node_id: NodeId) -> Result<f64, RingError> {
        self.node_position(node_id)
            .ok_or_else(|| RingError::UnknownNode {
                ring: self.entity.full_name(),
                node: node_id,
            })
    }

    /// Place a packet on the ring at the position of `entry_node_id`.
    ///
    /// High priority packets are placed ahead of all other packets so that
    /// they are found first when more than one packet is passing a node.
    pub fn insert_packet(
        &self,
        now: f64,
        mut packet: Packet,
        entry_node_id: NodeId,
        priority: Priority,
    ) -> Result<(), RingError> {
        let entry_point = self.position_or_err(entry_node_id)?;
        packet.stamp_transmission(now, entry_point, entry_node_id, priority);

        enter!(self.entity ; packet.id());
        trace!(self.entity ; "insert {} at {:.3}m ({})", packet, entry_point, priority);

        let mut in_flight = self.in_flight.borrow_mut();
        self.drop_expired(&mut in_flight, now);
        match priority {
            Priority::High => in_flight.insert(0, packet),
            Priority::Low => in_flight.push(packet),
        }
        Ok(())
    }

    /// Return a copy of the first packet addressed to `node_id` that is
    /// passing it at time `now`.
    #[must_use]
    pub fn check_packet(&self, now: f64, node_id: NodeId) -> Option<Packet> {
        let node_position = self.node_position(node_id)?;
        self.in_flight
            .borrow()
            .iter()
            .find(|packet| {
                packet.destination_node_id() == node_id
                    && !self.is_expired(packet, now)
                    && self.is_adjacent(packet, node_position, now)
            })
            .cloned()
    }

    /// Take a packet off the ring.
    ///
    /// The packet must still be passing `node_id` at `reception_timestamp`.
    /// Packets that have expired by then have already been dropped.
    pub fn remove_packet(
        &self,
        node_id: NodeId,
        packet: &Packet,
        reception_timestamp: f64,
    ) -> Result<Packet, RingError> {
        let node_position = self.position_or_err(node_id)?;
        let mut in_flight = self.in_flight.borrow_mut();
        self.drop_expired(&mut in_flight, reception_timestamp);
        let index = in_flight
            .iter()
            .position(|p| p.id() == packet.id())
            .ok_or_else(|| RingError::NotOnRing {
                ring: self.entity.full_name(),
                packet: packet.id(),
            })?;

        if !self.is_adjacent(&in_flight[index], node_position, reception_timestamp) {
            return Err(RingError::NotAdjacent {
                ring: self.entity.full_name(),
                node: node_id,
                packet: packet.id(),
            });
        }

        let mut removed = in_flight.remove(index);
        removed.set_reception_timestamp(reception_timestamp);
        exit!(self.entity ; removed.id());
        Ok(removed)
    }
}
