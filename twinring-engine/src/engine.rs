// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The [Engine] owns the executor, the clocks and the registered components of
//! a simulation.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Release;

use twinring_track::entity::{Entity, toplevel};
use twinring_track::tracker::stdout_tracker;
use twinring_track::{Tracker, debug, info};

use crate::executor::{self, Executor, Spawner};
use crate::time::clock::Clock;
use crate::types::{Component, SimResult};

/// Use a default clock frequency of 1GHz.
const DEFAULT_CLOCK_MHZ: f64 = 1000.0;

pub struct Engine {
    pub executor: Executor,
    pub spawner: Spawner,
    toplevel: Rc<Entity>,
    tracker: Tracker,

    /// Components whose `run()` is spawned when the simulation starts.
    registered: RefCell<Vec<Component>>,
}

impl Engine {
    /// Create a standalone engine.
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let (executor, spawner) = executor::new_executor_and_spawner(&toplevel);
        Self {
            executor,
            spawner,
            toplevel,
            tracker: tracker.clone(),
            registered: RefCell::new(Vec::new()),
        }
    }

    /// Register a component so that it is started by [Engine::run] or
    /// [Engine::run_for_ns].
    pub fn register(&self, component: Component) {
        self.registered.borrow_mut().push(component);
    }

    fn spawn_registered(&self) {
        let registered: Vec<Component> = self.registered.borrow_mut().drain(..).collect();
        debug!(self.toplevel ; "starting {} components", registered.len());
        for component in registered {
            self.executor.spawn(async move { component.run().await });
        }
    }

    /// Run until all tasks which must complete have completed.
    pub fn run(&mut self) -> SimResult {
        self.spawn_registered();

        // Pass an atomic bool that will never be set to true
        let finished = Rc::new(AtomicBool::new(false));
        self.executor.run(&finished)
    }

    /// Run until the given simulation time. Background tasks keep running
    /// until the horizon even if all other tasks have completed.
    pub fn run_for_ns(&mut self, horizon_ns: f64) -> SimResult {
        self.spawn_registered();

        let finished = Rc::new(AtomicBool::new(false));
        {
            let finished = finished.clone();
            let clock = self.default_clock();
            let ticks = clock.ns_to_ticks(horizon_ns).max(0.0).ceil() as u64;
            let top = self.toplevel.clone();
            self.executor.spawn(async move {
                clock.wait_ticks(ticks).await;
                info!(top ; "horizon of {horizon_ns:.1}ns reached");
                finished.store(true, Release);
                Ok(())
            });
        }

        self.executor.run(&finished)
    }

    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.executor.spawn(future);
    }

    #[must_use]
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn default_clock(&self) -> Clock {
        self.executor.get_clock(DEFAULT_CLOCK_MHZ)
    }

    pub fn clock_mhz(&self, freq_mhz: f64) -> Clock {
        self.executor.get_clock(freq_mhz)
    }

    /// Get a clock whose ticks are `period_ns` apart.
    pub fn clock_period_ns(&self, period_ns: f64) -> Clock {
        self.executor.get_clock(1000.0 / period_ns)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.executor.time_now_ns()
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

/// Create a default engine that sends [`Track`](twinring_track::Track) events
/// to stdout.
impl Default for Engine {
    fn default() -> Self {
        let tracker = stdout_tracker(log::Level::Warn);
        Self::new(&tracker)
    }
}
