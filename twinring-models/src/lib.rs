// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Models of a dual-plane ring network.
//!
//! Stations share one control ring, on which they reserve a receiver with
//! `Add` and `Remove` control packets, and a number of data rings which carry
//! the payload. Each station has a transmitter and a receiver:
//!
//! ```text
//!             +-----+        control ring        +-----+
//!       +---->| tx0 |------------>-------------->| rx1 |----+
//!       |     +-----+                            +-----+    |
//!       |        |        data ring 0               ^       |
//!       |        +-------------->-------------------+       |
//!       +-------------------------<--------------------------+
//! ```
//!
//! A receiver queues the reservations addressed to it and listens to the
//! data ring of the station at the head of its queue.
//!
//! The [Model](model::Model) is built from a
//! [TopologyConfig](config::TopologyConfig) and shared by every station.

pub mod codec;
pub mod config;
pub mod model;
pub mod packet;
pub mod receiver;
pub mod ring;
pub mod stats;
pub mod test_helpers;
pub mod timing;
pub mod transmitter;
pub mod types;
