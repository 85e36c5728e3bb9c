// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The reservations made by each station.

use std::fmt;

use rand::SeedableRng;
use rand::seq::IteratorRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use twinring_models::transmitter::Reservation;
use twinring_models::types::{NodeId, Priority};

#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, PartialEq)]
pub enum TrafficPattern {
    /// Each station reserves the other stations in turn, starting with the
    /// next one around the ring. No two stations reserve the same receiver
    /// at once.
    #[default]
    Neighbours,

    /// Each reservation is made to a random other station.
    Random,
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrafficPattern::Neighbours => write!(f, "neighbours"),
            TrafficPattern::Random => write!(f, "random"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TrafficConfig {
    pub pattern: TrafficPattern,
    pub reservations_per_node: usize,
    pub packets_per_reservation: usize,
    pub hold_circulations: u32,
    /// Every n-th reservation of a station is high priority. Zero for none.
    pub high_priority_every: usize,
    pub seed: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::Neighbours,
            reservations_per_node: 4,
            packets_per_reservation: 8,
            hold_circulations: 2,
            high_priority_every: 0,
            seed: 1,
        }
    }
}

impl TrafficConfig {
    fn priority(&self, k: usize) -> Priority {
        if self.high_priority_every > 0 && (k + 1) % self.high_priority_every == 0 {
            Priority::High
        } else {
            Priority::Low
        }
    }

    /// The reservations made by the station at `index` in `node_ids`.
    ///
    /// A network with a single station has nobody to send to.
    #[must_use]
    pub fn reservations_for(&self, node_ids: &[NodeId], index: usize) -> Vec<Reservation> {
        let num_nodes = node_ids.len();
        if num_nodes < 2 {
            return Vec::new();
        }
        let source = node_ids[index];

        // A different random sequence per station
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed ^ u64::from(source));

        (0..self.reservations_per_node)
            .filter_map(|k| {
                let destination = match self.pattern {
                    TrafficPattern::Neighbours => {
                        node_ids[(index + 1 + k % (num_nodes - 1)) % num_nodes]
                    }
                    TrafficPattern::Random => node_ids
                        .iter()
                        .copied()
                        .filter(|&id| id != source)
                        .choose(&mut rng)?,
                };
                Some(
                    Reservation::new(destination, self.packets_per_reservation)
                        .with_priority(self.priority(k))
                        .with_hold_circulations(self.hold_circulations),
                )
            })
            .collect()
    }
}
