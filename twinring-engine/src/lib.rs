// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `TwinRing` engine
//!
//! This library provides the discrete-event [engine](crate::engine) which
//! executes the asynchronous tasks of a ring network simulation.
//!
//! All tasks run on a single thread. A task only gives up control when it
//! waits on a [clock](crate::time::clock), so everything a task does between
//! two waits appears atomic to every other task. Tasks woken for the same
//! instant are run in the order in which they were scheduled which keeps
//! simulation runs reproducible.
//!
//! # Simple Application
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use twinring_engine::engine::Engine;
//! use twinring_engine::run_simulation;
//!
//! let mut engine = Engine::default();
//! let clock = engine.clock_period_ns(10.0);
//! let ticks = Rc::new(Cell::new(0));
//! {
//!     let ticks = ticks.clone();
//!     engine.spawn(async move {
//!         for _ in 0..4 {
//!             clock.wait_ticks(1).await;
//!             ticks.set(ticks.get() + 1);
//!         }
//!         Ok(())
//!     });
//! }
//! run_simulation!(engine);
//! assert_eq!(ticks.get(), 4);
//! assert_eq!(engine.time_now_ns(), 40.0);
//! ```

pub mod engine;
pub mod executor;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;

#[macro_export]
/// Spawn all registered component run() functions and then run the
/// simulation.
macro_rules! run_simulation {
    ($engine:ident) => {
        $engine.run().unwrap();
    };
    ($engine:ident, $expect:expr) => {
        match $engine.run() {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}
