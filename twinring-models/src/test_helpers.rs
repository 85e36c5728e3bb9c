// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Networks small enough to reason about in tests.

use std::rc::Rc;

use twinring_engine::engine::Engine;

use crate::config::{ClockConfig, ConfigError, NodeConfig, TopologyConfig};
use crate::model::Model;
use crate::types::NodeId;

/// A 5m ring at 1m/ns, so one circulation takes 5ns.
///
/// Nodes 0 to 3 sit at 0m to 3m. Every clock and slot is 1ns and node `i`
/// transmits on data ring `i % 2`.
#[must_use]
pub fn small_network_config() -> TopologyConfig {
    let mut config = TopologyConfig::default();
    config.constants.speed = 1.0;
    config.network.length = 5.0;
    config.network.num_data_rings = 2;
    config.network.nodes = (0..4)
        .map(|id: NodeId| NodeConfig {
            id,
            position: Some(f64::from(id)),
            data_ring: None,
            clock: None,
        })
        .collect();
    config.control_ring.slot_ns = 1.0;
    config.data_ring.slot_ns = 1.0;
    config.clock = ClockConfig {
        control_packet_bits: 20,
        control_rate_gbps: 20.0,
        data_packet_bits: 8,
        data_tx_rate_gbps: 8.0,
        data_rx_rate_gbps: 8.0,
    };
    config
}

/// Build the [small network](small_network_config) under the engine's
/// top-level entity.
pub fn small_network(engine: &Engine) -> Result<Rc<Model>, ConfigError> {
    Model::new(engine.top(), &small_network_config())
}
