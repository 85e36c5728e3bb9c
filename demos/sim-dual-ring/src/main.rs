// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate stations reserving each other over a dual-plane ring network.
//!
//! See `lib.rs` for details.

use std::path::PathBuf;

use clap::Parser;
use sim_dual_ring::simulate;
use sim_dual_ring::traffic::{TrafficConfig, TrafficPattern};
use twinring_engine::engine::Engine;
use twinring_engine::sim_error;
use twinring_engine::types::SimError;
use twinring_models::config::TopologyConfig;
use twinring_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use twinring_track::{Track, Tracker, error, info, warn};

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "Dual-plane ring network reservation simulation")]
struct Cli {
    /// TOML file describing the network. Values can be overridden by
    /// `TWINRING_` environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<String>,

    /// Level of log message to write to the log file.
    #[arg(long, default_value = "Trace")]
    log_file_level: log::Level,

    /// Set a regular expression for which entites should have log file level
    /// set to `--log-file-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    log_file_filter_regex: String,

    /// Stop the simulation at this time (in ns) instead of when all stations
    /// have finished sending.
    #[arg(long)]
    horizon_ns: Option<f64>,

    /// How stations choose whom to reserve.
    #[arg(long, value_enum, default_value_t = TrafficPattern::default())]
    traffic_pattern: TrafficPattern,

    /// Seed for random number generator.
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Number of reservations made by each station.
    #[arg(long, default_value = "4")]
    reservations_per_node: usize,

    /// Number of data packets sent for each reservation.
    #[arg(long, default_value = "8")]
    packets_per_reservation: usize,

    /// Number of ring circulations for which each reservation is held.
    #[arg(long, default_value = "2")]
    hold_circulations: u32,

    /// Make every n-th reservation of a station high priority. Use 0 for no
    /// high priority reservations.
    #[arg(long, default_value = "0")]
    high_priority_every: usize,
}

fn setup_all_trackers(args: &Cli) -> Result<Tracker, SimError> {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: args.stdout,
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: None,
        },
        log_file: TrackerConfig {
            enable: args.log_file.is_some(),
            level: args.log_file_level,
            filter_regex: &args.log_file_filter_regex,
            file: args.log_file.as_deref(),
        },
    };
    setup_trackers(&config).map_err(|e| SimError(e.to_string()))
}

fn main() -> Result<(), SimError> {
    let args = Cli::parse();

    let tracker = setup_all_trackers(&args)?;
    let mut engine = Engine::new(&tracker);
    let top = engine.top().clone();

    let config = TopologyConfig::load(args.config.as_deref())?;
    let traffic = TrafficConfig {
        pattern: args.traffic_pattern,
        reservations_per_node: args.reservations_per_node,
        packets_per_reservation: args.packets_per_reservation,
        hold_circulations: args.hold_circulations,
        high_priority_every: args.high_priority_every,
        seed: args.seed,
    };

    let outcome = simulate(&mut engine, &config, &traffic, args.horizon_ns)?;
    let stations = &outcome.stations;

    info!(top ; "{}", outcome.stats.summary());
    info!(top ; "{}/{} data packets delivered, finished at {:.1}ns",
        stations.num_data_received(), stations.num_data_sent(), engine.time_now_ns());
    if stations.num_queued() > 0 {
        warn!(top ; "{} reservations still held at the end", stations.num_queued());
    }

    let num_errors = outcome.stats.num_errors();
    if num_errors > 0 {
        for (destination, count) in outcome.stats.errors_per_destination() {
            error!(top ; "{count} errors at node {destination}");
        }
        tracker.shutdown();
        return sim_error!(format!("{num_errors} integrity errors recorded"));
    }

    info!(top ; "Pass");
    tracker.shutdown();
    Ok(())
}
