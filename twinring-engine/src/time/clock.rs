// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Each [Clock] counts ticks at its own frequency. All clocks created by the
//! same [SimTime](crate::time::simtime::SimTime) share a view of the global
//! simulation time so that a task which switches between clocks never
//! schedules itself in the past.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Tolerance used when mapping a time in `ns` onto the tick grid of a clock.
const TICK_EPSILON: f64 = 1e-9;

/// ClockTick structure for representing a number of Clock ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTick {
    /// Clock ticks.
    tick: u64,
}

impl ClockTick {
    #[must_use]
    pub fn new() -> Self {
        Self { tick: 0 }
    }

    /// Get the current clock tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Change the default constructor value of `tick`.
    pub fn set_tick(&mut self, tick: u64) -> ClockTick {
        self.tick = tick;
        *self
    }
}

impl fmt::Display for ClockTick {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tick)
    }
}

pub struct TaskWaker {
    /// The Waker to use to make a task active again.
    pub waker: Waker,

    /// When a task is scheduled in the future it may be a background task
    /// that will simply run forever in which case it will set `can_exit` to
    /// true.
    pub can_exit: bool,
}

/// Shared state between futures using a Clock and the Clock itself.
pub struct ClockState {
    now: Cell<ClockTick>,

    /// Global simulation time (shared by all clocks of one simulation).
    global_ns: Rc<Cell<f64>>,

    /// Queue of futures waiting for the right time.
    pub waiting: RefCell<Vec<Vec<TaskWaker>>>,

    /// Queue of times at which those futures are to be woken. This is kept
    /// sorted latest-first so that the last entry is the next to be woken.
    pub waiting_times: RefCell<Vec<ClockTick>>,
}

impl ClockState {
    fn schedule(&self, schedule_time: ClockTick, cx: &mut Context<'_>, can_exit: bool) {
        let mut waiting_times = self.waiting_times.borrow_mut();
        let mut waiting = self.waiting.borrow_mut();
        let task_waker = TaskWaker {
            waker: cx.waker().clone(),
            can_exit,
        };
        match waiting_times.binary_search_by(|probe| schedule_time.cmp(probe)) {
            Ok(index) => {
                // Time already exists, add this task after the others
                waiting[index].push(task_waker);
            }
            Err(index) => {
                waiting_times.insert(index, schedule_time);
                waiting.insert(index, vec![task_waker]);
            }
        }
    }

    fn advance_time(&self, to_time: ClockTick) {
        assert!(to_time >= self.now.get(), "Time moving backwards");
        self.now.set(to_time);
    }
}

#[derive(Clone)]
/// State representing a clock.
pub struct Clock {
    /// Frequency of the clock in MHz.
    /// *Note*: Should never be changed as it is registered at this frequency.
    freq_mhz: f64,

    pub shared_state: Rc<ClockState>,
}

impl Clock {
    /// Create a new standalone [Clock] at the specified frequency.
    #[must_use]
    pub fn new(freq_mhz: f64) -> Self {
        Self::new_with_time(freq_mhz, Rc::new(Cell::new(0.0)))
    }

    pub(crate) fn new_with_time(freq_mhz: f64, global_ns: Rc<Cell<f64>>) -> Self {
        assert!(freq_mhz > 0.0, "Clock frequency must be positive");
        let shared_state = Rc::new(ClockState {
            now: Cell::new(ClockTick::new()),
            global_ns,
            waiting: RefCell::new(Vec::new()),
            waiting_times: RefCell::new(Vec::new()),
        });

        Self {
            freq_mhz,
            shared_state,
        }
    }

    /// Returns the clocks frequency in MHz.
    #[must_use]
    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    /// Returns the duration of one tick in `ns`.
    #[must_use]
    pub fn period_ns(&self) -> f64 {
        1000.0 / self.freq_mhz
    }

    /// Returns the current [ClockTick] of this clock.
    ///
    /// This is the tick at which a task using this clock was last woken.
    #[must_use]
    pub fn tick_now(&self) -> ClockTick {
        self.shared_state.now.get()
    }

    /// Returns the current time of this clock in `ns`.
    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.to_ns(&self.tick_now())
    }

    /// Returns the time in `ns` of the next event registered with this clock.
    #[must_use]
    pub fn time_of_next(&self) -> f64 {
        match self.shared_state.waiting_times.borrow().last() {
            Some(clock_time) => self.to_ns(clock_time),
            None => f64::MAX,
        }
    }

    /// Returns whether any task is waiting on this clock.
    #[must_use]
    pub fn has_waiting(&self) -> bool {
        !self.shared_state.waiting_times.borrow().is_empty()
    }

    /// Convert the given [ClockTick] to a time in `ns` for this clock.
    #[must_use]
    pub fn to_ns(&self, clock_time: &ClockTick) -> f64 {
        clock_time.tick as f64 / self.freq_mhz * 1000.0
    }

    /// Convert a duration in `ns` to a (possibly fractional) number of ticks.
    #[must_use]
    pub fn ns_to_ticks(&self, duration_ns: f64) -> f64 {
        duration_ns * self.freq_mhz / 1000.0
    }

    /// The tick from which a new wait is measured.
    ///
    /// This is the last tick edge at or before the global simulation time,
    /// which may be later than the last tick this clock woke a task at.
    fn base_tick(&self) -> ClockTick {
        let global_ticks = self.ns_to_ticks(self.shared_state.global_ns.get());
        let global_tick = ClockTick {
            tick: (global_ticks + TICK_EPSILON).floor() as u64,
        };
        global_tick.max(self.tick_now())
    }

    /// Returns the number of ticks to wait from now to reach the tick edge
    /// nearest to `time_ns`. Times in the past give zero.
    #[must_use]
    pub fn ticks_until_ns(&self, time_ns: f64) -> u64 {
        let target = self.ns_to_ticks(time_ns).round().max(0.0) as u64;
        target.saturating_sub(self.base_tick().tick)
    }

    fn delay_until(&self, ticks: u64, can_exit: bool) -> ClockDelay {
        let mut until = self.base_tick();
        until.tick += ticks;
        if self.to_ns(&until) + TICK_EPSILON < self.shared_state.global_ns.get() {
            // Waiting zero ticks from between two edges moves to the next edge
            until.tick += 1;
        }
        ClockDelay {
            shared_state: self.shared_state.clone(),
            until,
            state: ClockDelayState::Pending,
            can_exit,
        }
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks(&self, ticks: u64) -> ClockDelay {
        self.delay_until(ticks, false)
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks. However, if the remainder of the simulation
    /// completes then this future is allowed to not complete. This allows the
    /// user to create tasks that can run continuously as long as the rest of
    /// the simulation continues to run.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks_or_exit(&self, ticks: u64) -> ClockDelay {
        self.delay_until(ticks, true)
    }
}

/// The default clocks is simply to use a 1GHz clock so ticks are 1ns.
impl Default for Clock {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Clock")
            .field("freq_mhz", &self.freq_mhz)
            .field("now", &self.tick_now())
            .finish()
    }
}

/// Possible states of a ClockDelay.
enum ClockDelayState {
    Pending,
    Running,
}

/// Future returned by the clock to manage advancing time using async functions.
pub struct ClockDelay {
    shared_state: Rc<ClockState>,
    until: ClockTick,
    state: ClockDelayState,
    can_exit: bool,
}

impl Future for ClockDelay {
    type Output = ();
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state {
            ClockDelayState::Pending => {
                self.shared_state.schedule(self.until, cx, self.can_exit);
                self.state = ClockDelayState::Running;
                Poll::Pending
            }
            ClockDelayState::Running => {
                self.shared_state.advance_time(self.until);
                Poll::Ready(())
            }
        }
    }
}
