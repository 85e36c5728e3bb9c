// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Per-node clock cycles.
//!
//! The cycle for each kind of traffic is the time taken to serialise one
//! packet at the link rate. A packet of `bits` at `rate` Gbit/s takes
//! `bits / rate` ns.

use crate::config::ClockConfig;
use crate::types::TrafficKind;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeClock {
    config: ClockConfig,
}

impl NodeClock {
    #[must_use]
    pub fn new(config: ClockConfig) -> Self {
        Self { config }
    }

    /// Duration of one cycle in `ns`.
    #[must_use]
    pub fn cycle_ns(&self, kind: TrafficKind) -> f64 {
        let config = &self.config;
        match kind {
            TrafficKind::Control => {
                f64::from(config.control_packet_bits) / config.control_rate_gbps
            }
            TrafficKind::DataTransmit => {
                f64::from(config.data_packet_bits) / config.data_tx_rate_gbps
            }
            TrafficKind::DataReceive => {
                f64::from(config.data_packet_bits) / config.data_rx_rate_gbps
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn default_cycles() {
        let clock = NodeClock::new(ClockConfig::default());
        assert_relative_eq!(clock.cycle_ns(TrafficKind::Control), 10.0);
        assert_relative_eq!(clock.cycle_ns(TrafficKind::DataTransmit), 10.0);
        assert_relative_eq!(clock.cycle_ns(TrafficKind::DataReceive), 10.0);
    }

    #[test]
    fn cycles_follow_rates() {
        let clock = NodeClock::new(ClockConfig {
            control_packet_bits: 18,
            control_rate_gbps: 9.0,
            data_packet_bits: 512,
            data_tx_rate_gbps: 64.0,
            data_rx_rate_gbps: 128.0,
        });
        assert_relative_eq!(clock.cycle_ns(TrafficKind::Control), 2.0);
        assert_relative_eq!(clock.cycle_ns(TrafficKind::DataTransmit), 8.0);
        assert_relative_eq!(clock.cycle_ns(TrafficKind::DataReceive), 4.0);
    }
}
