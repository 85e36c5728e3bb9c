// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Packets carried by the control and data rings.
//!
//! The payload of a packet never changes once created. The timestamps and
//! addressing fields are filled in as the packet is placed on a ring, queued
//! by a receiver and finally removed from a ring.

use std::fmt;
use std::rc::Rc;

use twinring_track::entity::Entity;
use twinring_track::id::Unique;
use twinring_track::{Id, create, create_id};

use crate::types::{NodeId, Priority};

/// The opaque encoded contents of a packet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RawPayload(String);

impl RawPayload {
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RawPayload {
    fn from(payload: &str) -> Self {
        Self::new(payload)
    }
}

impl From<String> for RawPayload {
    fn from(payload: String) -> Self {
        Self(payload)
    }
}

impl fmt::Display for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Packet {
    created_by: Rc<Entity>,
    id: Id,
    raw_payload: RawPayload,
    generation_timestamp: f64,
    transmission_timestamp: f64,
    /// Position on the ring (in metres) at which the packet was inserted.
    entry_point: f64,
    entry_node_id: NodeId,
    destination_node_id: NodeId,
    priority: Priority,
    reception_timestamp: Option<f64>,
    /// Only set for control packets held in a RAM queue.
    enqueue_timestamp: Option<f64>,
}

impl Packet {
    /// Create a packet which will be sent from `source` to `destination`.
    #[must_use]
    pub fn new(
        created_by: &Rc<Entity>,
        raw_payload: RawPayload,
        source: NodeId,
        destination: NodeId,
        generation_timestamp: f64,
    ) -> Self {
        let packet = Self {
            created_by: created_by.clone(),
            id: create_id!(created_by),
            raw_payload,
            generation_timestamp,
            transmission_timestamp: generation_timestamp,
            entry_point: 0.0,
            entry_node_id: source,
            destination_node_id: destination,
            priority: Priority::Low,
            reception_timestamp: None,
            enqueue_timestamp: None,
        };
        create!(created_by ; packet, packet.num_bytes());
        packet
    }

    #[must_use]
    pub fn set_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn raw_payload(&self) -> &RawPayload {
        &self.raw_payload
    }

    #[must_use]
    pub fn generation_timestamp(&self) -> f64 {
        self.generation_timestamp
    }

    #[must_use]
    pub fn transmission_timestamp(&self) -> f64 {
        self.transmission_timestamp
    }

    #[must_use]
    pub fn entry_point(&self) -> f64 {
        self.entry_point
    }

    #[must_use]
    pub fn entry_node_id(&self) -> NodeId {
        self.entry_node_id
    }

    #[must_use]
    pub fn destination_node_id(&self) -> NodeId {
        self.destination_node_id
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn reception_timestamp(&self) -> Option<f64> {
        self.reception_timestamp
    }

    #[must_use]
    pub fn enqueue_timestamp(&self) -> Option<f64> {
        self.enqueue_timestamp
    }

    /// Size of the packet when sent as one bit per payload character.
    #[must_use]
    pub fn num_bytes(&self) -> usize {
        self.raw_payload.len().div_ceil(8)
    }

    pub(crate) fn stamp_transmission(
        &mut self,
        now: f64,
        entry_point: f64,
        entry_node_id: NodeId,
        priority: Priority,
    ) {
        self.transmission_timestamp = now;
        self.entry_point = entry_point;
        self.entry_node_id = entry_node_id;
        self.priority = priority;
    }

    pub(crate) fn set_reception_timestamp(&mut self, now: f64) {
        self.reception_timestamp = Some(now);
    }

    pub(crate) fn set_enqueue_timestamp(&mut self, now: f64) {
        self.enqueue_timestamp = Some(now);
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} {} -> {}",
            self.created_by, self.raw_payload, self.entry_node_id, self.destination_node_id
        )
    }
}

impl Unique for Packet {
    fn id(&self) -> Id {
        self.id
    }
}
