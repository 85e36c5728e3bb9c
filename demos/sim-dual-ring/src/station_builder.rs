// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use twinring_engine::engine::Engine;
use twinring_engine::types::SimError;
use twinring_models::model::Model;
use twinring_models::receiver::{ReceiverEngine, ReservationBehaviour, StationBehaviour};
use twinring_models::stats::StatsCollector;
use twinring_models::transmitter::Transmitter;
use twinring_track::entity::Entity;

use crate::traffic::TrafficConfig;

pub struct Stations {
    pub receivers: Vec<Rc<ReceiverEngine>>,
    pub transmitters: Vec<Rc<Transmitter>>,
}

impl Stations {
    #[must_use]
    pub fn num_data_sent(&self) -> usize {
        self.transmitters.iter().map(|tx| tx.num_data_sent()).sum()
    }

    #[must_use]
    pub fn num_data_received(&self) -> usize {
        self.receivers
            .iter()
            .map(|rx| rx.received_data_log().len())
            .sum()
    }

    /// Reservations still held when the simulation ended.
    #[must_use]
    pub fn num_queued(&self) -> usize {
        self.receivers.iter().map(|rx| rx.queue_len()).sum()
    }
}

/// Create a receiver and a transmitter for every node of the model.
pub fn build_stations(
    engine: &Engine,
    model: &Rc<Model>,
    stats: &Rc<StatsCollector>,
    traffic: &TrafficConfig,
) -> Result<Stations, SimError> {
    let behaviour: Rc<dyn StationBehaviour> = Rc::new(ReservationBehaviour);
    let node_ids = model.node_ids();

    let mut receivers = Vec::with_capacity(node_ids.len());
    let mut transmitters = Vec::with_capacity(node_ids.len());
    for (index, &id) in node_ids.iter().enumerate() {
        let station = Rc::new(Entity::new(engine.top(), &format!("station{id}")));
        receivers.push(ReceiverEngine::new_and_register(
            engine,
            &station,
            id,
            model,
            stats.clone(),
            behaviour.clone(),
        )?);
        transmitters.push(Transmitter::new_and_register(
            engine,
            &station,
            id,
            model,
            traffic.reservations_for(&node_ids, index),
        )?);
    }

    Ok(Stations {
        receivers,
        transmitters,
    })
}
