// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::error::Error;
use std::fmt;

use twinring_engine::types::SimError;

use crate::codec::CodecError;
use crate::ring::RingError;
use crate::types::{NodeId, RingId};

/// Problems found by a receiver while handling a packet.
///
/// None of these stop the receiver. Integrity faults are recorded in the
/// network error log and the packet that caused them is dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum ReceiverFault {
    UnknownControlCode { source: NodeId, code: u8 },
    /// A `Remove` that matches no queued `Add`.
    OrphanRemove { source: NodeId, destination: NodeId },
    Ring(RingError),
    Codec(CodecError),
    UnknownDataRing(RingId),
    /// A reservation from a node that has no data ring.
    UnknownSource(NodeId),
}

impl ReceiverFault {
    #[must_use]
    pub fn is_integrity_fault(&self) -> bool {
        !matches!(self, ReceiverFault::UnknownControlCode { .. })
    }
}

impl fmt::Display for ReceiverFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReceiverFault::UnknownControlCode { source, code } => {
                write!(f, "unknown control code {code} from {source}")
            }
            ReceiverFault::OrphanRemove {
                source,
                destination,
            } => write!(
                f,
                "remove from {source} to {destination} has no matching add"
            ),
            ReceiverFault::Ring(e) => write!(f, "{e}"),
            ReceiverFault::Codec(e) => write!(f, "{e}"),
            ReceiverFault::UnknownDataRing(ring_id) => write!(f, "no data ring {ring_id}"),
            ReceiverFault::UnknownSource(source) => {
                write!(f, "no data ring for source {source}")
            }
        }
    }
}

impl Error for ReceiverFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReceiverFault::Ring(e) => Some(e),
            ReceiverFault::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReceiverFault> for SimError {
    fn from(e: ReceiverFault) -> Self {
        SimError(e.to_string())
    }
}

impl From<RingError> for ReceiverFault {
    fn from(e: RingError) -> Self {
        ReceiverFault::Ring(e)
    }
}

impl From<CodecError> for ReceiverFault {
    fn from(e: CodecError) -> Self {
        ReceiverFault::Codec(e)
    }
}
