/// Events: the unit of coordination in the simulation kernel.
///
/// An `Event` is a cheap-clone handle to shared state. Processes await
/// events; the scheduler dispatches them in `(time, id)` order; waiters
/// and callbacks attached to an event run exactly once when the event is
/// processed. `ValueEvent<V>` adds a value slot filled at trigger time
/// and delivered to awaiters on resume.

use std::cell::RefCell;
use std::future::Future;
use std::mem;
use std::ops::{BitAnd, BitOr};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::process::{self, ProcessId};
use crate::simulation::SimContext;

// ── Event state ───────────────────────────────────────────────────────

/// The life cycle of an event.
///
/// Allowed transitions: `Pending → Triggered → Processed`,
/// `Pending → Processed` (timeouts fire without an explicit trigger),
/// and `Pending → Aborted`. `Processed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Not yet triggered or aborted.
    Pending,

    /// Triggered; queued to be processed at the current simulation time.
    Triggered,

    /// Processed: waiters resumed, callbacks run.
    Processed,

    /// Aborted: waiters destroyed, callbacks discarded.
    Aborted,
}

/// Shared state behind every `Event` handle.
pub(crate) struct EventCore {
    state: EventState,

    /// Processes suspended on this event, in await order.
    waiters: Vec<ProcessId>,

    /// Callbacks to run when the event is processed, in insertion order.
    callbacks: Vec<Box<dyn FnOnce()>>,
}

impl EventCore {
    fn new() -> Self {
        EventCore {
            state: EventState::Pending,
            waiters: Vec::new(),
            callbacks: Vec::new(),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A point-in-time happening in the simulation.
///
/// Handles share state: cloning an `Event` clones the handle, not the
/// event. The event stays alive while any handle or a scheduler queue
/// entry refers to it.
#[derive(Clone)]
pub struct Event {
    pub(crate) core: Rc<RefCell<EventCore>>,
    pub(crate) ctx: SimContext,
}

impl Event {
    pub(crate) fn new(ctx: SimContext) -> Self {
        Event {
            core: Rc::new(RefCell::new(EventCore::new())),
            ctx,
        }
    }

    /// Current state of the event.
    pub fn state(&self) -> EventState {
        self.core.borrow().state
    }

    /// Whether the event is pending.
    pub fn pending(&self) -> bool {
        self.state() == EventState::Pending
    }

    /// Whether the event is triggered *or* processed.
    pub fn triggered(&self) -> bool {
        matches!(self.state(), EventState::Triggered | EventState::Processed)
    }

    /// Whether the event is processed.
    pub fn processed(&self) -> bool {
        self.state() == EventState::Processed
    }

    /// Whether the event is aborted.
    pub fn aborted(&self) -> bool {
        self.state() == EventState::Aborted
    }

    /// Set the event to triggered and schedule it for processing at the
    /// current simulation time. If the event is not pending, nothing is
    /// done.
    pub fn trigger(&self) {
        if !self.pending() {
            return;
        }
        self.core.borrow_mut().state = EventState::Triggered;
        tracing::trace!("event triggered");
        self.ctx.schedule_event(self.clone(), 0.0);
    }

    /// Set the event to aborted. Every waiting process is destroyed and
    /// all callbacks are discarded. If the event is not pending, nothing
    /// is done.
    pub fn abort(&self) {
        if !self.pending() {
            return;
        }
        let (waiters, callbacks) = {
            let mut core = self.core.borrow_mut();
            core.state = EventState::Aborted;
            (mem::take(&mut core.waiters), mem::take(&mut core.callbacks))
        };
        if !waiters.is_empty() {
            tracing::debug!(waiters = waiters.len(), "event aborted with waiters");
        }
        // Frames are dropped outside any kernel borrow: destructors of
        // values captured by a process body may call back into the
        // simulation.
        let frames: Vec<_> = {
            let mut sim = self.ctx.core.borrow_mut();
            waiters
                .into_iter()
                .filter_map(|pid| sim.processes.remove(&pid))
                .collect()
        };
        drop(frames);
        drop(callbacks);
    }

    /// Attach a callback to run when the event is processed. If the
    /// event is already processed or aborted, the callback is dropped
    /// and never invoked.
    pub fn add_callback(&self, cb: impl FnOnce() + 'static) {
        let mut core = self.core.borrow_mut();
        match core.state {
            EventState::Pending | EventState::Triggered => {
                core.callbacks.push(Box::new(cb));
            }
            EventState::Processed | EventState::Aborted => {}
        }
    }

    /// Park a process on this event. Kernel-internal: user code suspends
    /// via `.await`.
    pub(crate) fn add_waiter(&self, pid: ProcessId) {
        self.core.borrow_mut().waiters.push(pid);
    }

    /// Process the event: resume all waiters in await order, then run
    /// all callbacks in insertion order. Called exactly once by the
    /// scheduler when this event's queue entry is popped; a no-op if the
    /// event was already processed or aborted.
    pub(crate) fn process(&self) {
        let (waiters, callbacks) = {
            let mut core = self.core.borrow_mut();
            match core.state {
                EventState::Processed | EventState::Aborted => return,
                EventState::Pending | EventState::Triggered => {}
            }
            core.state = EventState::Processed;
            (mem::take(&mut core.waiters), mem::take(&mut core.callbacks))
        };
        for pid in waiters {
            process::resume(&self.ctx, pid);
        }
        for cb in callbacks {
            cb();
        }
    }

    /// The state handles behind `self` and `other` are the same event.
    pub fn same_event(&self, other: &Event) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// Poll helper shared by the `Future` impls: ready when processed,
    /// dooms the calling process when aborted, parks it otherwise.
    pub(crate) fn poll_wait(&self) -> Poll<()> {
        match self.state() {
            EventState::Processed => Poll::Ready(()),
            EventState::Aborted => {
                // The awaiting frame must not run again; the kernel
                // destroys it as soon as this poll returns.
                self.ctx.doom_current();
                Poll::Pending
            }
            EventState::Pending | EventState::Triggered => {
                let pid = self.ctx.current_process();
                self.add_waiter(pid);
                Poll::Pending
            }
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.same_event(other)
    }
}

impl Eq for Event {}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("state", &self.state()).finish()
    }
}

/// Awaiting an event suspends the process until the event is processed.
/// Awaiting an aborted event destroys the process; no further code in
/// its body runs.
impl Future for Event {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        self.poll_wait()
    }
}

// ── Value event ───────────────────────────────────────────────────────

/// An event carrying a value set at trigger time.
///
/// The value is single-assignment and delivered (cloned) to every
/// awaiter on resume.
pub struct ValueEvent<V> {
    inner: Event,
    slot: Rc<RefCell<Option<V>>>,
}

impl<V> ValueEvent<V> {
    pub(crate) fn new(ctx: SimContext) -> Self {
        ValueEvent {
            inner: Event::new(ctx),
            slot: Rc::new(RefCell::new(None)),
        }
    }

    /// Set the value, then trigger the event. If the event is not
    /// pending, nothing is done and `value` is dropped.
    pub fn trigger(&self, value: V) {
        if !self.inner.pending() {
            return;
        }
        *self.slot.borrow_mut() = Some(value);
        self.inner.trigger();
    }

    /// Abort the event. See [`Event::abort`].
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Whether the event is pending.
    pub fn pending(&self) -> bool {
        self.inner.pending()
    }

    /// Whether the event is triggered or processed.
    pub fn triggered(&self) -> bool {
        self.inner.triggered()
    }

    /// Whether the event is processed.
    pub fn processed(&self) -> bool {
        self.inner.processed()
    }

    /// Whether the event is aborted.
    pub fn aborted(&self) -> bool {
        self.inner.aborted()
    }

    /// Attach a callback. See [`Event::add_callback`].
    pub fn add_callback(&self, cb: impl FnOnce() + 'static) {
        self.inner.add_callback(cb);
    }

    /// The value carried by the event.
    ///
    /// # Panics
    /// Panics if the event has not been triggered, or was triggered
    /// through its untyped handle without a value.
    pub fn value(&self) -> V
    where
        V: Clone,
    {
        assert!(
            self.inner.triggered(),
            "value read from an event that has not been triggered"
        );
        self.slot
            .borrow()
            .clone()
            .expect("value event triggered without a value")
    }

    /// Fill the slot without triggering. Used by delayed value events,
    /// which fire through the queue rather than through `trigger`.
    pub(crate) fn set_value(&self, value: V) {
        *self.slot.borrow_mut() = Some(value);
    }
}

impl<V> Clone for ValueEvent<V> {
    fn clone(&self) -> Self {
        ValueEvent {
            inner: self.inner.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<V> PartialEq for ValueEvent<V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<V> Eq for ValueEvent<V> {}

impl<V> std::fmt::Debug for ValueEvent<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueEvent")
            .field("state", &self.inner.state())
            .field("has_value", &self.slot.borrow().is_some())
            .finish()
    }
}

/// Awaiting a value event yields its value on resume.
impl<V: Clone> Future for ValueEvent<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<V> {
        match self.inner.poll_wait() {
            Poll::Ready(()) => Poll::Ready(self.value()),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ── Awaitable ─────────────────────────────────────────────────────────

/// Anything that exposes an underlying [`Event`]: events, value events,
/// and process completion handles. This is what the `|` and `&`
/// operators and the combinators accept.
pub trait Awaitable {
    /// A handle to the underlying event.
    fn event(&self) -> Event;
}

impl Awaitable for Event {
    fn event(&self) -> Event {
        self.clone()
    }
}

impl<V> Awaitable for ValueEvent<V> {
    fn event(&self) -> Event {
        self.inner.clone()
    }
}

// ── Operator sugar ────────────────────────────────────────────────────

/// `a | b`: a fresh event that fires when either side is processed.
impl<R: Awaitable> BitOr<R> for Event {
    type Output = Event;

    fn bitor(self, other: R) -> Event {
        let ctx = self.ctx.clone();
        ctx.any_of(&[self, other.event()])
    }
}

/// `a & b`: a fresh event that fires when both sides are processed.
impl<R: Awaitable> BitAnd<R> for Event {
    type Output = Event;

    fn bitand(self, other: R) -> Event {
        let ctx = self.ctx.clone();
        ctx.all_of(&[self, other.event()])
    }
}

/// `a | b` on value events preserves the winner's value.
impl<V: Clone + 'static> BitOr for ValueEvent<V> {
    type Output = ValueEvent<V>;

    fn bitor(self, other: ValueEvent<V>) -> ValueEvent<V> {
        let ctx = self.inner.ctx.clone();
        ctx.any_of_values(&[self, other])
    }
}

/// `a & b` on value events: completion only, the values are not joined.
impl<V, R: Awaitable> BitAnd<R> for ValueEvent<V> {
    type Output = Event;

    fn bitand(self, other: R) -> Event {
        let ctx = self.inner.ctx.clone();
        ctx.all_of(&[self.event(), other.event()])
    }
}
