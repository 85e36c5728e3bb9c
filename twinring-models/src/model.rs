// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The network being simulated.
//!
//! The [Model] owns the control ring, the data rings, the clock of every
//! node and the codec used for control packets. It is shared by all the
//! receivers and transmitters of a simulation.

use std::collections::BTreeMap;
use std::rc::Rc;

use twinring_track::entity::Entity;
use twinring_track::{info, warn};

use crate::codec::{CodecError, PacketCodec};
use crate::config::{ConfigError, TopologyConfig};
use crate::packet::RawPayload;
use crate::ring::Ring;
use crate::timing::NodeClock;
use crate::types::{ControlCode, ControlTriple, NodeId, RingId};

struct NodeInfo {
    data_ring: RingId,
    clock: NodeClock,
}

pub struct Model {
    pub entity: Rc<Entity>,
    control_ring: Rc<Ring>,
    data_rings: Vec<Rc<Ring>>,
    nodes: BTreeMap<NodeId, NodeInfo>,
    codec: PacketCodec,
    speed: f64,
    length: f64,
}

impl Model {
    /// Build the network described by `config`.
    pub fn new(parent: &Rc<Entity>, config: &TopologyConfig) -> Result<Rc<Self>, ConfigError> {
        config.validate()?;

        let entity = Rc::new(Entity::new(parent, "net"));
        for warning in config.warnings() {
            warn!(entity ; "{warning}");
        }

        let layout = config.node_layout();
        let positions: Vec<(NodeId, f64)> =
            layout.iter().map(|node| (node.id, node.position)).collect();

        let speed = config.constants.speed;
        let length = config.network.length;
        let control_ring = Rc::new(Ring::new(
            &entity,
            "control_ring",
            length,
            speed,
            config.control_ring.slot_ns,
            &positions,
        ));
        let data_rings = (0..config.network.num_data_rings)
            .map(|i| {
                Rc::new(Ring::new(
                    &entity,
                    &format!("data_ring{i}"),
                    length,
                    speed,
                    config.data_ring.slot_ns,
                    &positions,
                ))
            })
            .collect();

        let nodes = layout
            .iter()
            .map(|node| {
                (
                    node.id,
                    NodeInfo {
                        data_ring: node.data_ring,
                        clock: NodeClock::new(node.clock),
                    },
                )
            })
            .collect();

        let codec = PacketCodec::new(config.codec.address_bits, config.codec.control_bits)?;

        info!(entity ; "{} nodes, {} data rings, circulation {:.1}ns",
            layout.len(), config.network.num_data_rings, length / speed);

        Ok(Rc::new(Self {
            entity,
            control_ring,
            data_rings,
            nodes,
            codec,
            speed,
            length,
        }))
    }

    #[must_use]
    pub fn control_ring(&self) -> &Rc<Ring> {
        &self.control_ring
    }

    #[must_use]
    pub fn data_ring(&self, ring_id: RingId) -> Option<&Rc<Ring>> {
        self.data_rings.get(ring_id)
    }

    #[must_use]
    pub fn num_data_rings(&self) -> usize {
        self.data_rings.len()
    }

    #[must_use]
    pub fn node_clock(&self, node_id: NodeId) -> Option<&NodeClock> {
        self.nodes.get(&node_id).map(|node| &node.clock)
    }

    /// The data ring on which `source` transmits.
    #[must_use]
    pub fn data_ring_for(&self, source: NodeId) -> Option<RingId> {
        self.nodes.get(&source).map(|node| node.data_ring)
    }

    /// Node ids in ascending order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[must_use]
    pub fn circulation_time(&self) -> f64 {
        self.length / self.speed
    }

    #[must_use]
    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    pub fn generate_packet(
        &self,
        source: NodeId,
        destination: NodeId,
        control: ControlCode,
    ) -> Result<RawPayload, CodecError> {
        self.codec.generate_packet(source, destination, control)
    }

    pub fn interpret_control_packet(&self, raw: &RawPayload) -> Result<ControlTriple, CodecError> {
        self.codec.interpret_control_packet(raw)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use twinring_track::entity::toplevel;
    use twinring_track::test_helpers::create_tracker;

    use super::*;

    #[test]
    fn default_network() {
        let tracker = create_tracker(file!());
        let top = toplevel(&tracker, "top");
        let model = Model::new(&top, &TopologyConfig::default()).unwrap();

        assert_eq!(model.node_ids(), vec![0, 1, 2, 3]);
        assert_eq!(model.num_data_rings(), 2);
        assert!(model.data_ring(2).is_none());
        assert_eq!(model.data_ring_for(3), Some(1));
        assert!(model.data_ring_for(4).is_none());
        assert_relative_eq!(model.circulation_time(), 5000.0);
        assert_relative_eq!(model.control_ring().circulation_time(), 5000.0);
        assert_eq!(model.control_ring().node_position(2), Some(500.0));
        assert_eq!(
            model.control_ring().entity.full_name(),
            "top::net::control_ring"
        );
    }

    #[test]
    fn codec_through_model() {
        let tracker = create_tracker(file!());
        let top = toplevel(&tracker, "top");
        let model = Model::new(&top, &TopologyConfig::default()).unwrap();

        let raw = model.generate_packet(2, 1, ControlCode::Add).unwrap();
        let triple = model.interpret_control_packet(&raw).unwrap();
        assert_eq!(triple.source, 2);
        assert_eq!(triple.destination, 1);
        assert_eq!(triple.control, ControlCode::Add);
    }

    #[test]
    fn invalid_config_rejected() {
        let tracker = create_tracker(file!());
        let top = toplevel(&tracker, "top");
        let mut config = TopologyConfig::default();
        config.network.length = -1.0;
        assert!(Model::new(&top, &config).is_err());
    }
}
