// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Types shared by the rings, receivers and transmitters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a station on the network.
pub type NodeId = u32;

/// Index of a data ring.
pub type RingId = usize;

/// Priority with which a packet is placed on a ring and into a RAM queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    #[default]
    Low,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// The operation requested by a control packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCode {
    /// Reserve the receiver for a source.
    Add,
    /// Release a reservation made by an earlier `Add`.
    Remove,
    /// Any other value that fits the control field.
    Unknown(u8),
}

impl ControlCode {
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            ControlCode::Add => 0,
            ControlCode::Remove => 1,
            ControlCode::Unknown(value) => value,
        }
    }
}

impl From<u8> for ControlCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ControlCode::Add,
            1 => ControlCode::Remove,
            other => ControlCode::Unknown(other),
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlCode::Add => write!(f, "add"),
            ControlCode::Remove => write!(f, "remove"),
            ControlCode::Unknown(value) => write!(f, "unknown({value})"),
        }
    }
}

/// The fields carried by a control packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlTriple {
    pub source: NodeId,
    pub destination: NodeId,
    pub control: ControlCode,
}

impl fmt::Display for ControlTriple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} -> {}", self.control, self.source, self.destination)
    }
}

/// The kinds of traffic a node has a clock cycle for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficKind {
    Control,
    DataTransmit,
    DataReceive,
}

/// The operations recorded in a receiver's queue log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOperation {
    Added,
    Removed,
    Processed,
    Unknown,
    /// A `Remove` for which no phase-aligned `Add` was queued.
    Orphaned,
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            QueueOperation::Added => "Added",
            QueueOperation::Removed => "Removed",
            QueueOperation::Processed => "Processed",
            QueueOperation::Unknown => "Unknown",
            QueueOperation::Orphaned => "Orphaned",
        };
        write!(f, "{name}")
    }
}
