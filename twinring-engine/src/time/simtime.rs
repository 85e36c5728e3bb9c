// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Time is a floating-point count of `ns` which is advanced to the time of the
//! next event across all clocks.

use std::cell::Cell;
use std::rc::Rc;

use twinring_track::entity::Entity;
use twinring_track::set_time;

use super::clock::Clock;
use crate::time::clock::TaskWaker;

/// The overall owner of time within a simulation.
///
/// Contains all Clocks and the current simulation time in ns.
pub struct SimTime {
    pub entity: Rc<Entity>,

    /// Shared with every clock so that waits are measured from global time.
    current_ns: Rc<Cell<f64>>,

    /// Clocks are auto-created as required. Clocks created earlier take
    /// precedence when two clocks have events at the same time.
    clocks: Vec<Clock>,
}

impl SimTime {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "time")),
            current_ns: Rc::new(Cell::new(0.0)),
            clocks: Vec::new(),
        }
    }

    pub fn get_clock(&mut self, freq_mhz: f64) -> Clock {
        for clock in &self.clocks {
            if clock.freq_mhz() == freq_mhz {
                return clock.clone();
            }
        }
        let clock = Clock::new_with_time(freq_mhz, self.current_ns.clone());
        self.clocks.push(clock.clone());
        clock
    }

    /// Choose the clock with the next time and return the associated Wakers.
    pub fn advance_time(&mut self) -> Option<Vec<TaskWaker>> {
        let next_clock = self
            .clocks
            .iter()
            .filter(|clock| clock.has_waiting())
            .min_by(|a, b| a.time_of_next().total_cmp(&b.time_of_next()))?;

        let clock_time = next_clock.shared_state.waiting_times.borrow_mut().pop()?;
        let next_ns = next_clock.to_ns(&clock_time);
        if self.current_ns.get() != next_ns {
            set_time!(self.entity ; next_ns);
            self.current_ns.set(next_ns);
        }
        next_clock.shared_state.waiting.borrow_mut().pop()
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.current_ns.get()
    }

    /// The simulation can exit if all scheduled tasks can exit.
    #[must_use]
    pub fn can_exit(&self) -> bool {
        self.clocks.iter().all(|clock| {
            clock
                .shared_state
                .waiting
                .borrow()
                .iter()
                .flatten()
                .all(|task_waker| task_waker.can_exit)
        })
    }
}

#[cfg(test)]
mod tests {
    use twinring_track::entity::toplevel;
    use twinring_track::test_helpers::create_tracker;

    use super::*;

    #[test]
    fn clock_created_once() {
        let tracker = create_tracker(file!());
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk1 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);

        let _clk2 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);
    }

    #[test]
    fn create_different_clocks() {
        let tracker = create_tracker(file!());
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk1 = time.get_clock(1000.0);
        let _clk2 = time.get_clock(100.0);
        assert_eq!(time.clocks.len(), 2);
    }

    #[test]
    fn nothing_waiting() {
        let tracker = create_tracker(file!());
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk = time.get_clock(1000.0);
        assert!(time.can_exit());
        assert!(time.advance_time().is_none());
        assert_eq!(time.time_now_ns(), 0.0);
    }
}
