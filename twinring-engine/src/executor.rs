// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A single-threaded executor for simulation tasks.
//!
//! Tasks are only polled when they have been woken, either because they are
//! new or because the clock they were waiting on has reached their time.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Acquire;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use twinring_track::entity::Entity;
use twinring_track::trace;

use crate::time::clock::Clock;
use crate::time::simtime::SimTime;
use crate::types::SimResult;

const TASK_WAKER_VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_raw_waker, wake_task, wake_task_by_ref, drop_raw_waker);

fn task_raw_waker(task: Rc<Task>) -> RawWaker {
    let ptr = Rc::into_raw(task) as *const ();
    RawWaker::new(ptr, &TASK_WAKER_VTABLE)
}

fn waker_for_task(task: Rc<Task>) -> Waker {
    unsafe { Waker::from_raw(task_raw_waker(task)) }
}

unsafe fn clone_raw_waker(data: *const ()) -> RawWaker {
    unsafe {
        // Tasks are always wrapped in a reference counter to allow them to be shared
        // read-only.
        Rc::increment_strong_count(data as *const Task);
        RawWaker::new(data, &TASK_WAKER_VTABLE)
    }
}

unsafe fn wake_task(data: *const ()) {
    unsafe {
        // Waking consumes the waker so the reference count is handed on to
        // the queue of woken tasks.
        let rc_task = Rc::from_raw(data as *const Task);
        let executor_state = rc_task.executor_state.clone();
        executor_state.new_tasks.borrow_mut().push(rc_task);
    }
}

unsafe fn wake_task_by_ref(data: *const ()) {
    unsafe {
        Rc::increment_strong_count(data as *const Task);
        wake_task(data);
    }
}

unsafe fn drop_raw_waker(data: *const ()) {
    unsafe {
        drop(Rc::from_raw(data as *const Task));
    }
}

struct Task {
    future: RefCell<Pin<Box<dyn Future<Output = SimResult>>>>,
    executor_state: Rc<ExecutorState>,
}

impl Task {
    pub fn new(
        future: impl Future<Output = SimResult> + 'static,
        executor_state: Rc<ExecutorState>,
    ) -> Task {
        Task {
            future: RefCell::new(Box::pin(future)),
            executor_state,
        }
    }

    fn poll(&self, context: &mut Context) -> Poll<SimResult> {
        self.future.borrow_mut().as_mut().poll(context)
    }
}

struct ExecutorState {
    task_queue: RefCell<Vec<Rc<Task>>>,
    new_tasks: RefCell<Vec<Rc<Task>>>,
    time: RefCell<SimTime>,
}

impl ExecutorState {
    pub fn new(top: &Rc<Entity>) -> Self {
        Self {
            task_queue: RefCell::new(Vec::new()),
            new_tasks: RefCell::new(Vec::new()),
            time: RefCell::new(SimTime::new(top)),
        }
    }

    fn spawn(state: &Rc<ExecutorState>, future: impl Future<Output = SimResult> + 'static) {
        state
            .new_tasks
            .borrow_mut()
            .push(Rc::new(Task::new(future, state.clone())));
    }
}

/// Single-threaded executor
///
/// This is a thin-wrapper (using [`Rc`]) around the real executor, so that this
/// struct can be cloned and passed around.
///
/// See the [module documentation] for more details.
///
/// [module documentation]: index.html
#[derive(Clone)]
pub struct Executor {
    pub entity: Rc<Entity>,
    state: Rc<ExecutorState>,
}

impl Executor {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        ExecutorState::spawn(&self.state, future);
    }

    /// Run until `finished` is set, an error is returned by a task, or there
    /// is nothing left that must complete.
    pub fn run(&self, finished: &Rc<AtomicBool>) -> SimResult {
        loop {
            self.step(finished)?;
            if finished.load(Acquire) {
                break;
            }

            if self.state.new_tasks.borrow().is_empty() {
                let wakers = {
                    let mut time = self.state.time.borrow_mut();
                    if time.can_exit() {
                        trace!(self.entity ; "only background tasks remain");
                        break;
                    }
                    time.advance_time()
                };
                match wakers {
                    Some(wakers) => {
                        for task_waker in wakers {
                            task_waker.waker.wake();
                        }
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }

    pub fn step(&self, finished: &Rc<AtomicBool>) -> SimResult {
        // Append new tasks created since the last step into the task queue
        let mut task_queue = self.state.task_queue.borrow_mut();
        task_queue.append(&mut self.state.new_tasks.borrow_mut());

        // Poll each woken task. A task that is not ready will have parked
        // itself with the clock it is waiting on.
        for task in task_queue.drain(..) {
            if finished.load(Acquire) {
                break;
            }

            let waker = waker_for_task(task.clone());
            let mut context = Context::from_waker(&waker);

            match task.poll(&mut context) {
                Poll::Ready(Err(e)) => {
                    // Error - return early
                    return Err(e);
                }
                Poll::Ready(Ok(())) => {
                    // Otherwise, drop task as it is complete
                }
                Poll::Pending => {}
            }
        }
        Ok(())
    }

    pub fn get_clock(&self, freq_mhz: f64) -> Clock {
        self.state.time.borrow_mut().get_clock(freq_mhz)
    }

    pub fn time_now_ns(&self) -> f64 {
        self.state.time.borrow().time_now_ns()
    }
}

/// `Spawner` spawns new futures into the executor.
///
/// It also gives tasks access to the global simulation time.
#[derive(Clone)]
pub struct Spawner {
    state: Rc<ExecutorState>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        ExecutorState::spawn(&self.state, future);
    }

    /// Returns the current simulation time in `ns`.
    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.state.time.borrow().time_now_ns()
    }
}

pub fn new_executor_and_spawner(top: &Rc<Entity>) -> (Executor, Spawner) {
    let state = Rc::new(ExecutorState::new(top));
    let entity = Rc::new(Entity::new(top, "executor"));
    (
        Executor {
            entity,
            state: state.clone(),
        },
        Spawner { state },
    )
}
