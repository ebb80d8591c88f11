/// Simulation core and execution loop.
///
/// [`Simulation`] owns the shared core and drives it: `step` pops the
/// earliest scheduled event, advances virtual time, and processes the
/// event, which resumes waiters and runs callbacks. [`SimContext`] is
/// the cheap-clone handle that process bodies use to create events,
/// spawn further processes, and read the clock.
///
/// The kernel is single-threaded and cooperative: exactly one process
/// runs at a time, and control returns to the loop only at `.await`
/// points. Triggering and scheduling are safe from anywhere; resumption
/// happens exclusively inside `step`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::rc::Rc;

use crate::event::{Awaitable, Event, ValueEvent};
use crate::process::{self, Process, ProcessFrame, ProcessId};
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Shared core ───────────────────────────────────────────────────────

/// State shared by the driver, every context handle, and every event.
pub(crate) struct SimCore {
    /// The time-ordered event queue.
    pub(crate) scheduler: Scheduler,

    /// Current virtual time.
    pub(crate) now: VirtualTime,

    /// Every live process frame, owned here and nowhere else.
    pub(crate) processes: HashMap<ProcessId, ProcessFrame>,

    /// Next process identifier.
    pub(crate) next_process_id: u64,

    /// The process currently being polled, if any.
    pub(crate) current: Option<ProcessId>,

    /// Set when the current process awaited an aborted event; the
    /// resume machinery destroys the frame instead of re-parking it.
    pub(crate) current_aborted: bool,

    /// Total events dispatched so far.
    pub(crate) events_processed: u64,
}

impl SimCore {
    fn new() -> Self {
        SimCore {
            scheduler: Scheduler::new(),
            now: VirtualTime::ZERO,
            processes: HashMap::new(),
            next_process_id: 0,
            current: None,
            current_aborted: false,
            events_processed: 0,
        }
    }
}

// ── Context handle ────────────────────────────────────────────────────

/// Handle to a running simulation.
///
/// Cloning is cheap; process bodies capture one to create events and
/// read the clock. The handle deliberately exposes no way to drive the
/// loop: `step`/`run` live on [`Simulation`], so a process can never
/// re-enter the dispatcher.
#[derive(Clone)]
pub struct SimContext {
    pub(crate) core: Rc<RefCell<SimCore>>,
}

impl SimContext {
    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.core.borrow().now
    }

    /// A fresh pending event bound to this simulation.
    pub fn event(&self) -> Event {
        Event::new(self.clone())
    }

    /// A fresh pending value event bound to this simulation.
    pub fn value_event<V>(&self) -> ValueEvent<V> {
        ValueEvent::new(self.clone())
    }

    /// A new event scheduled to fire `delay` after the current time.
    ///
    /// # Panics
    /// Panics if `delay` is negative.
    pub fn timeout(&self, delay: f64) -> Event {
        let ev = self.event();
        self.schedule_event(ev.clone(), delay);
        ev
    }

    /// A new value event carrying `value`, scheduled to fire `delay`
    /// after the current time.
    ///
    /// # Panics
    /// Panics if `delay` is negative.
    pub fn timeout_value<V>(&self, delay: f64, value: V) -> ValueEvent<V> {
        let ev = self.value_event();
        ev.set_value(value);
        self.schedule_event(ev.event(), delay);
        ev
    }

    /// Push an existing event onto the queue, to fire `delay` after the
    /// current time.
    ///
    /// # Panics
    /// Panics if `delay` is negative.
    pub fn schedule(&self, event: &Event, delay: f64) {
        self.schedule_event(event.clone(), delay);
    }

    /// Spawn a process. The body starts at the current virtual time,
    /// after everything already queued for this instant.
    pub fn spawn<V, F>(&self, body: F) -> Process<V>
    where
        V: 'static,
        F: Future<Output = V> + 'static,
    {
        process::spawn(self, body)
    }

    /// A fresh event that fires as soon as any of `events` is processed.
    ///
    /// An event that never fires never contributes; if every input is
    /// aborted the result stays pending forever.
    pub fn any_of(&self, events: &[Event]) -> Event {
        let result = self.event();
        for ev in events {
            if ev.processed() {
                result.trigger();
            } else {
                let result = result.clone();
                ev.add_callback(move || result.trigger());
            }
        }
        result
    }

    /// Value-preserving [`any_of`](SimContext::any_of): the winner's
    /// value is carried into the result at its trigger time.
    pub fn any_of_values<V>(&self, events: &[ValueEvent<V>]) -> ValueEvent<V>
    where
        V: Clone + 'static,
    {
        let result = self.value_event();
        for ev in events {
            if ev.processed() {
                result.trigger(ev.value());
            } else {
                let result = result.clone();
                let source = ev.clone();
                ev.add_callback(move || result.trigger(source.value()));
            }
        }
        result
    }

    /// A fresh event that fires once all of `events` are processed.
    ///
    /// Fires immediately when no input is still outstanding. If any
    /// input is aborted before being processed, the result never fires.
    pub fn all_of(&self, events: &[Event]) -> Event {
        let result = self.event();
        let outstanding = Rc::new(Cell::new(0usize));
        for ev in events {
            if ev.processed() {
                continue;
            }
            outstanding.set(outstanding.get() + 1);
            let result = result.clone();
            let outstanding = outstanding.clone();
            ev.add_callback(move || {
                outstanding.set(outstanding.get() - 1);
                if outstanding.get() == 0 {
                    result.trigger();
                }
            });
        }
        if outstanding.get() == 0 {
            result.trigger();
        }
        result
    }

    /// Number of queued scheduler entries.
    pub fn pending_count(&self) -> usize {
        self.core.borrow().scheduler.len()
    }

    /// Number of live process frames.
    pub fn process_count(&self) -> usize {
        self.core.borrow().processes.len()
    }

    // ── Kernel internals ──────────────────────────────────────────

    pub(crate) fn schedule_event(&self, event: Event, delay: f64) {
        assert!(
            delay >= 0.0,
            "cannot schedule an event with negative delay: {}",
            delay
        );
        let mut core = self.core.borrow_mut();
        let at = core.now + delay;
        let id = core.scheduler.schedule(at, event);
        tracing::trace!(at = %at, id = %id, "event scheduled");
    }

    pub(crate) fn current_process(&self) -> ProcessId {
        self.core
            .borrow()
            .current
            .expect("events can only be awaited from inside a simulation process")
    }

    pub(crate) fn doom_current(&self) {
        self.core.borrow_mut().current_aborted = true;
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("SimContext")
            .field("now", &core.now)
            .field("pending", &core.scheduler.len())
            .field("processes", &core.processes.len())
            .finish()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the core and tracks virtual time. Call [`run`](Simulation::run)
/// to execute until the queue is drained, [`run_until`] to stop at a
/// target time, or [`step`](Simulation::step) to advance by exactly one
/// event. Dropping the simulation destroys every still-suspended
/// process frame.
///
/// [`run_until`]: Simulation::run_until
pub struct Simulation {
    ctx: SimContext,
}

impl Simulation {
    /// Create a new simulation starting at time zero.
    pub fn new() -> Self {
        Simulation {
            ctx: SimContext {
                core: Rc::new(RefCell::new(SimCore::new())),
            },
        }
    }

    /// A context handle for use inside process bodies.
    pub fn handle(&self) -> SimContext {
        self.ctx.clone()
    }

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.ctx.now()
    }

    /// A fresh pending event. See [`SimContext::event`].
    pub fn event(&self) -> Event {
        self.ctx.event()
    }

    /// A fresh pending value event. See [`SimContext::value_event`].
    pub fn value_event<V>(&self) -> ValueEvent<V> {
        self.ctx.value_event()
    }

    /// A delayed event. See [`SimContext::timeout`].
    pub fn timeout(&self, delay: f64) -> Event {
        self.ctx.timeout(delay)
    }

    /// A delayed value event. See [`SimContext::timeout_value`].
    pub fn timeout_value<V>(&self, delay: f64, value: V) -> ValueEvent<V> {
        self.ctx.timeout_value(delay, value)
    }

    /// Spawn a process. See [`SimContext::spawn`].
    pub fn spawn<V, F>(&mut self, body: F) -> Process<V>
    where
        V: 'static,
        F: Future<Output = V> + 'static,
    {
        self.ctx.spawn(body)
    }

    /// See [`SimContext::any_of`].
    pub fn any_of(&self, events: &[Event]) -> Event {
        self.ctx.any_of(events)
    }

    /// See [`SimContext::any_of_values`].
    pub fn any_of_values<V>(&self, events: &[ValueEvent<V>]) -> ValueEvent<V>
    where
        V: Clone + 'static,
    {
        self.ctx.any_of_values(events)
    }

    /// See [`SimContext::all_of`].
    pub fn all_of(&self, events: &[Event]) -> Event {
        self.ctx.all_of(events)
    }

    /// Execute a single step: pop the earliest entry, advance time,
    /// process the event.
    ///
    /// # Panics
    /// Panics if the queue is empty.
    pub fn step(&mut self) {
        let entry = {
            let mut core = self.ctx.core.borrow_mut();
            let entry = core
                .scheduler
                .pop_next()
                .expect("step called on a simulation with no scheduled events");
            // Virtual time must never go backward.
            assert!(
                entry.at >= core.now,
                "time went backward: now={}, event at {}",
                core.now,
                entry.at
            );
            core.now = entry.at;
            core.events_processed += 1;
            entry
        };
        tracing::trace!(at = %entry.at, id = %entry.id, "dispatching event");
        entry.event.process();
    }

    /// Run until the event queue is empty.
    pub fn run(&mut self) {
        while !self.is_empty() {
            self.step();
        }
    }

    /// Run while the next scheduled event fires strictly before
    /// `target`, then set the clock to `target`. Events scheduled
    /// exactly at `target` are left in the queue.
    ///
    /// # Panics
    /// Panics if `target` is before the current time.
    pub fn run_until(&mut self, target: VirtualTime) {
        assert!(
            target >= self.now(),
            "cannot run into the past: now={}, target={}",
            self.now(),
            target
        );
        loop {
            let due = {
                let core = self.ctx.core.borrow();
                matches!(core.scheduler.peek_next(), Some(entry) if entry.at < target)
            };
            if !due {
                break;
            }
            self.step();
        }
        self.ctx.core.borrow_mut().now = target;
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_empty(&self) -> bool {
        self.ctx.core.borrow().scheduler.is_empty()
    }

    /// Total events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.ctx.core.borrow().events_processed
    }

    /// Number of queued scheduler entries.
    pub fn pending_count(&self) -> usize {
        self.ctx.pending_count()
    }

    /// Number of live process frames.
    pub fn process_count(&self) -> usize {
        self.ctx.process_count()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown: destroy every still-suspended frame and every queued
/// entry. Dropping a frame can spawn or schedule (user destructors run
/// arbitrary code), so the reap loops until the core is quiescent.
impl Drop for Simulation {
    fn drop(&mut self) {
        loop {
            let (frames, entries) = {
                let mut core = self.ctx.core.borrow_mut();
                (mem::take(&mut core.processes), core.scheduler.clear())
            };
            if frames.is_empty() && entries.is_empty() {
                break;
            }
            tracing::debug!(
                processes = frames.len(),
                entries = entries.len(),
                "reaping at shutdown"
            );
            drop(frames);
            drop(entries);
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("ctx", &self.ctx)
            .field("events_processed", &self.events_processed())
            .finish()
    }
}
