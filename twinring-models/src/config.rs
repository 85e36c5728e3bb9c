// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Topology configuration.
//!
//! The configuration is built up from (lowest priority first):
//!  - the built-in defaults,
//!  - an optional TOML file,
//!  - environment variables starting with `TWINRING_`, using `__` to separate
//!    nested fields. For example `TWINRING_NETWORK__NUM_NODES=8`.
//!
//! A TOML file for a small network might look like:
//!
//! ```toml
//! [constants]
//! speed = 0.2
//!
//! [network]
//! length = 1000.0
//! num_data_rings = 2
//!
//! [[network.nodes]]
//! id = 0
//! position = 0.0
//!
//! [[network.nodes]]
//! id = 1
//! position = 250.0
//! data_ring = 1
//! ```

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use twinring_engine::types::SimError;

use crate::codec::{CodecError, DEFAULT_ADDRESS_BITS, DEFAULT_CONTROL_BITS, PacketCodec};
use crate::timing::NodeClock;
use crate::types::{NodeId, RingId, TrafficKind};

/// Prefix of environment variables which override the configuration.
pub const ENV_PREFIX: &str = "TWINRING_";

/// Tolerance (in ns) used when comparing durations.
const DURATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug)]
pub enum ConfigError {
    /// The configuration sources could not be read or extracted.
    Figment(Box<figment::Error>),
    /// A configuration file that does not exist.
    MissingFile(PathBuf),
    /// A configuration that was read correctly but cannot be simulated.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Figment(e) => write!(f, "failed to read configuration: {e}"),
            ConfigError::MissingFile(path) => {
                write!(f, "configuration file {} not found", path.display())
            }
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Figment(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

impl From<CodecError> for ConfigError {
    fn from(e: CodecError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError(e.to_string())
    }
}

macro_rules! invalid {
    ($($arg:tt)+) => {
        Err(ConfigError::Invalid(format!($($arg)+)))
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constants {
    /// Propagation speed in metres per ns.
    pub speed: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self { speed: 0.2 }
    }
}

/// Settings for one node when the layout is given explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: NodeId,

    /// Position in metres. Nodes without a position are evenly spaced by
    /// their index in the list.
    #[serde(default)]
    pub position: Option<f64>,

    /// The data ring the node transmits on. Defaults to
    /// `id % num_data_rings`.
    #[serde(default)]
    pub data_ring: Option<RingId>,

    /// Replaces the network-wide clock settings for this node.
    #[serde(default)]
    pub clock: Option<ClockConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Ring length in metres.
    pub length: f64,

    /// Number of evenly spaced nodes used when `nodes` is empty.
    pub num_nodes: usize,

    pub num_data_rings: usize,

    pub nodes: Vec<NodeConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            length: 1000.0,
            num_nodes: 4,
            num_data_rings: 2,
            nodes: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub address_bits: u32,
    pub control_bits: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            address_bits: DEFAULT_ADDRESS_BITS,
            control_bits: DEFAULT_CONTROL_BITS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Time for which a passing packet can be read by a node.
    pub slot_ns: f64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self { slot_ns: 10.0 }
    }
}

/// Packet sizes and link rates from which node clock cycles are derived.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Size of a control frame on the wire, including framing.
    pub control_packet_bits: u32,
    pub control_rate_gbps: f64,
    pub data_packet_bits: u32,
    pub data_tx_rate_gbps: f64,
    pub data_rx_rate_gbps: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            control_packet_bits: 20,
            control_rate_gbps: 2.0,
            data_packet_bits: 1000,
            data_tx_rate_gbps: 100.0,
            data_rx_rate_gbps: 100.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub constants: Constants,
    pub network: NetworkConfig,
    pub codec: CodecConfig,
    pub control_ring: RingConfig,
    pub data_ring: RingConfig,
    pub clock: ClockConfig,
}

/// A node with every optional setting filled in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeLayout {
    pub id: NodeId,
    pub position: f64,
    pub data_ring: RingId,
    pub clock: ClockConfig,
}

impl TopologyConfig {
    /// Build the configuration from the defaults, an optional TOML file and
    /// the environment, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Time for a packet to travel once around a ring.
    #[must_use]
    pub fn circulation_time(&self) -> f64 {
        self.network.length / self.constants.speed
    }

    /// The position, data ring and clock of every node.
    #[must_use]
    pub fn node_layout(&self) -> Vec<NodeLayout> {
        let network = &self.network;
        let num_data_rings = network.num_data_rings.max(1);
        if network.nodes.is_empty() {
            let spacing = network.length / network.num_nodes.max(1) as f64;
            return (0..network.num_nodes)
                .map(|i| NodeLayout {
                    id: i as NodeId,
                    position: i as f64 * spacing,
                    data_ring: i % num_data_rings,
                    clock: self.clock,
                })
                .collect();
        }

        let spacing = network.length / network.nodes.len() as f64;
        network
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| NodeLayout {
                id: node.id,
                position: node.position.unwrap_or(i as f64 * spacing),
                data_ring: node
                    .data_ring
                    .unwrap_or(node.id as usize % num_data_rings),
                clock: node.clock.unwrap_or(self.clock),
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("constants.speed", self.constants.speed)?;
        check_positive("network.length", self.network.length)?;
        check_positive("control_ring.slot_ns", self.control_ring.slot_ns)?;
        check_positive("data_ring.slot_ns", self.data_ring.slot_ns)?;
        if self.network.num_data_rings == 0 {
            return invalid!("at least one data ring is required");
        }

        let codec = PacketCodec::new(self.codec.address_bits, self.codec.control_bits)?;

        let layout = self.node_layout();
        if layout.is_empty() {
            return invalid!("the network has no nodes");
        }

        let mut seen = HashSet::new();
        for node in &layout {
            if !seen.insert(node.id) {
                return invalid!("node {} is defined more than once", node.id);
            }
            if u64::from(node.id) > codec.max_node_id() {
                return invalid!(
                    "node {} cannot be addressed with {} address bits",
                    node.id,
                    codec.address_bits()
                );
            }
            if !(0.0..self.network.length).contains(&node.position) {
                return invalid!(
                    "node {} position {} is not on a ring of length {}",
                    node.id,
                    node.position,
                    self.network.length
                );
            }
            if node.data_ring >= self.network.num_data_rings {
                return invalid!(
                    "node {} uses data ring {} but there are only {}",
                    node.id,
                    node.data_ring,
                    self.network.num_data_rings
                );
            }
            validate_clock(node.id, &node.clock)?;

            let cycles = NodeClock::new(node.clock);
            check_slot_covers_cycle(
                node.id,
                "control_ring.slot_ns",
                self.control_ring.slot_ns,
                cycles.cycle_ns(TrafficKind::Control),
            )?;
            check_slot_covers_cycle(
                node.id,
                "data_ring.slot_ns",
                self.data_ring.slot_ns,
                cycles.cycle_ns(TrafficKind::DataReceive),
            )?;
        }
        Ok(())
    }

    /// Settings which can be simulated but will not behave as intended.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let circulation = self.circulation_time();
        let mut warnings = Vec::new();
        for node in self.node_layout() {
            let cycle = NodeClock::new(node.clock).cycle_ns(TrafficKind::Control);
            if !is_multiple(circulation, cycle) {
                warnings.push(format!(
                    "node {}: circulation time {circulation}ns is not a multiple of the {cycle}ns control cycle so reservations cannot be matched",
                    node.id
                ));
            }
        }
        warnings
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        invalid!("{name} must be positive, found {value}")
    }
}

fn validate_clock(id: NodeId, clock: &ClockConfig) -> Result<(), ConfigError> {
    if clock.control_packet_bits == 0 || clock.data_packet_bits == 0 {
        return invalid!("node {id}: packet sizes must be non-zero");
    }
    check_positive("clock.control_rate_gbps", clock.control_rate_gbps)?;
    check_positive("clock.data_tx_rate_gbps", clock.data_tx_rate_gbps)?;
    check_positive("clock.data_rx_rate_gbps", clock.data_rx_rate_gbps)
}

/// A station polls its rings once per cycle, so a packet passing it for less
/// than a cycle can go by unseen.
fn check_slot_covers_cycle(
    id: NodeId,
    name: &str,
    slot_ns: f64,
    cycle_ns: f64,
) -> Result<(), ConfigError> {
    if slot_ns + DURATION_TOLERANCE < cycle_ns {
        return invalid!("node {id}: {name} {slot_ns} is shorter than its {cycle_ns}ns cycle");
    }
    Ok(())
}

fn is_multiple(value: f64, of: f64) -> bool {
    let n = (value / of).round();
    (value - n * of).abs() <= DURATION_TOLERANCE
}
