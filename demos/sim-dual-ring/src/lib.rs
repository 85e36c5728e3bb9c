// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate stations reserving each other over a dual-plane ring network.
//!
//! Every node of the network has a receiver and a transmitter. Each
//! transmitter makes a number of reservations: it sends an `Add` on the
//! control ring, a burst of data packets on its own data ring and, once the
//! reservation has been held for the requested number of circulations, the
//! matching `Remove`.
//!
//! At the end of the simulation a summary of the packets received and their
//! latency is logged. The simulation fails if any receiver found a
//! reservation it could not account for.
//!
//! # Examples
//!
//! Four stations each making four reservations to their neighbours:
//! ```txt
//! cargo run --bin sim-dual-ring --release -- --stdout
//! ```
//!
//! Random traffic with some high priority reservations, using a network
//! described in a file:
//! ```txt
//! cargo run --bin sim-dual-ring --release -- --config network.toml \
//!     --traffic-pattern random --seed 3 --high-priority-every 4 --stdout
//! ```
//!
//! Any configuration value can also be set from the environment:
//! ```txt
//! TWINRING_NETWORK__NUM_NODES=8 cargo run --bin sim-dual-ring --release -- --stdout
//! ```

use std::rc::Rc;

use twinring_engine::engine::Engine;
use twinring_engine::types::SimError;
use twinring_models::config::TopologyConfig;
use twinring_models::model::Model;
use twinring_models::stats::StatsCollector;
use twinring_track::info;

pub mod station_builder;
pub mod traffic;

use crate::station_builder::{Stations, build_stations};
use crate::traffic::TrafficConfig;

pub struct Outcome {
    pub model: Rc<Model>,
    pub stats: Rc<StatsCollector>,
    pub stations: Stations,
}

/// Build the network and its stations then run the simulation, either to
/// completion or until `horizon_ns`.
pub fn simulate(
    engine: &mut Engine,
    config: &TopologyConfig,
    traffic: &TrafficConfig,
    horizon_ns: Option<f64>,
) -> Result<Outcome, SimError> {
    let model = Model::new(engine.top(), config)?;
    let stats = Rc::new(StatsCollector::new());
    let stations = build_stations(engine, &model, &stats, traffic)?;

    info!(engine.top() ; "{} stations, {} reservations each of {} packets, {} traffic",
        stations.receivers.len(), traffic.reservations_per_node,
        traffic.packets_per_reservation, traffic.pattern);

    match horizon_ns {
        Some(horizon_ns) => engine.run_for_ns(horizon_ns)?,
        None => engine.run()?,
    }

    Ok(Outcome {
        model,
        stats,
        stations,
    })
}
