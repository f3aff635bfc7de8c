#![deny(missing_docs)]
//! Native runtime shared by integration tests and demos.
//!
//! The browser gives the layer one thread, `setTimeout` and a microtask queue.
//! This crate reproduces that environment deterministically:
//! * [`VirtualTimers`] – a manual clock implementing [`Timers`]; time only moves when asked.
//! * [`LocalDriver`] – a single-threaded executor glued to the virtual clock.
//! * [`EventLog`] – timestamped record of events for post-run invariant checks.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use log::trace;
use resilience_core::{SharedTimers, Task, TimerId, Timers};

struct ClockState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), Task>,
    deadlines: HashMap<u64, Duration>,
    fired: u64,
}

/// Manually advanced clock and timer queue.
///
/// Timers with equal deadlines fire in scheduling order. Tasks run with no
/// internal borrow held, so they may schedule or clear timers freely.
#[derive(Clone)]
pub struct VirtualTimers {
    state: Rc<RefCell<ClockState>>,
}

impl Default for VirtualTimers {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(ClockState {
                now: Duration::ZERO,
                next_id: 1,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
                fired: 0,
            })),
        }
    }
}

impl VirtualTimers {
    /// Creates a clock at time zero with no pending timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased handle for components taking [`SharedTimers`].
    pub fn shared(&self) -> SharedTimers {
        Rc::new(self.clone())
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of timers still waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Total number of timers fired so far.
    pub fn fired(&self) -> u64 {
        self.state.borrow().fired
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.borrow().queue.keys().next().map(|(at, _)| *at)
    }

    /// Fires the earliest timer if its deadline is at or before `limit`.
    ///
    /// The clock jumps to the fired timer's deadline.
    pub fn fire_next_until(&self, limit: Duration) -> bool {
        let task = {
            let mut state = self.state.borrow_mut();
            let Some(&key) = state.queue.keys().next() else {
                return false;
            };
            if key.0 > limit {
                return false;
            }
            let task = state.queue.remove(&key);
            state.deadlines.remove(&key.1);
            state.now = state.now.max(key.0);
            state.fired += 1;
            task
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Fires the earliest pending timer, jumping the clock as far as needed.
    pub fn fire_next(&self) -> bool {
        self.fire_next_until(Duration::MAX)
    }

    /// Moves time forward by `by`, firing every timer that falls due on the way.
    pub fn advance(&self, by: Duration) {
        let target = self.now().saturating_add(by);
        while self.fire_next_until(target) {}
        let mut state = self.state.borrow_mut();
        state.now = state.now.max(target);
    }
}

impl Timers for VirtualTimers {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now.saturating_add(delay);
        state.queue.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        trace!("virtual timer {id} armed for {deadline:?}");
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            match state.deadlines.remove(&id.0) {
                Some(deadline) => state.queue.remove(&(deadline, id.0)),
                None => None,
            }
        };
        removed.is_some()
    }
}

/// Output slot of a future spawned on a [`LocalDriver`].
pub struct TaskOutput<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> TaskOutput<T> {
    /// True once the future has produced its value (and it has not been taken).
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Takes the produced value, if any.
    pub fn take(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }
}

/// Single-threaded executor driven by a [`VirtualTimers`] clock.
pub struct LocalDriver {
    pool: LocalPool,
    timers: VirtualTimers,
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDriver {
    /// Creates a driver with a fresh clock.
    pub fn new() -> Self {
        Self {
            pool: LocalPool::new(),
            timers: VirtualTimers::new(),
        }
    }

    /// The driver's clock.
    pub fn timers(&self) -> &VirtualTimers {
        &self.timers
    }

    /// Type-erased handle to the driver's clock.
    pub fn shared_timers(&self) -> SharedTimers {
        self.timers.shared()
    }

    /// Spawns `fut`; its output lands in the returned slot once it completes.
    pub fn spawn<F, T>(&self, fut: F) -> TaskOutput<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        let spawned = self.pool.spawner().spawn_local(async move {
            let value = fut.await;
            *out.borrow_mut() = Some(value);
        });
        if let Err(err) = spawned {
            log::error!("local driver failed to spawn task: {err}");
        }
        TaskOutput { slot }
    }

    /// Polls every ready task until none can make progress without time moving.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advances the clock by `by`, letting tasks react after each timer fires.
    pub fn advance(&mut self, by: Duration) {
        let target = self.timers.now().saturating_add(by);
        loop {
            self.pool.run_until_stalled();
            if !self.timers.fire_next_until(target) {
                break;
            }
        }
        let remaining = target.saturating_sub(self.timers.now());
        self.timers.advance(remaining);
        self.pool.run_until_stalled();
    }

    /// Runs tasks and fires timers until nothing is left to do.
    pub fn run_until_idle(&mut self) {
        loop {
            self.pool.run_until_stalled();
            if !self.timers.fire_next() {
                break;
            }
        }
    }

    /// Spawns `fut` and drives the driver until idle, returning its output.
    pub fn block_on<F, T>(&mut self, fut: F) -> Option<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let out = self.spawn(fut);
        self.run_until_idle();
        out.take()
    }
}

/// An event with the virtual time it was recorded at.
#[derive(Clone, Debug, PartialEq)]
pub struct Stamped<T> {
    /// Virtual time of the record.
    pub at: Duration,
    /// Global record order.
    pub seq: usize,
    /// The recorded event.
    pub event: T,
}

/// Append-only, timestamped record of events.
#[derive(Clone)]
pub struct EventLog<T> {
    clock: VirtualTimers,
    entries: Rc<RefCell<Vec<Stamped<T>>>>,
}

impl<T: Clone> EventLog<T> {
    /// Creates an empty log stamped by `clock`.
    pub fn new(clock: &VirtualTimers) -> Self {
        Self {
            clock: clock.clone(),
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Appends `event` at the current virtual time.
    pub fn record(&self, event: T) {
        let at = self.clock.now();
        let mut entries = self.entries.borrow_mut();
        let seq = entries.len();
        entries.push(Stamped { at, seq, event });
    }

    /// Copy of every entry so far.
    pub fn entries(&self) -> Vec<Stamped<T>> {
        self.entries.borrow().clone()
    }

    /// Copy of every event so far, without stamps.
    pub fn events(&self) -> Vec<T> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
