/// Process adapter: turns plain `async` blocks into simulation
/// processes.
///
/// A process is a future owned by the simulation core. It is started by
/// an initial zero-delay event, resumed only when an event it awaits is
/// processed, and destroyed when it returns, when it awaits an aborted
/// event, or when its completion handle is aborted. Completion is itself
/// an event: `spawn` returns a [`Process`] handle that other processes
/// can await, race, or join.

use std::future::Future;
use std::ops::{BitAnd, BitOr};
use std::pin::Pin;
use std::ptr;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::event::{Awaitable, Event, ValueEvent};
use crate::simulation::SimContext;

// ── Process ID ────────────────────────────────────────────────────────

/// Identifier of a live process frame inside the simulation core.
///
/// Events park waiters as `ProcessId`s rather than owning the frames,
/// which keeps the ownership graph acyclic: the core owns every frame,
/// an event owns nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ProcessId(pub(crate) u64);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P#{}", self.0)
    }
}

// ── Frame ─────────────────────────────────────────────────────────────

/// A suspended (or not-yet-started) process body.
pub(crate) struct ProcessFrame {
    /// The wrapped user future. Its output is `()`: the completion value
    /// is delivered through the completion event inside the wrapper.
    pub(crate) future: Pin<Box<dyn Future<Output = ()>>>,

    /// Untyped handle to the completion event, checked on every resume
    /// so an aborted process is destroyed instead of resumed.
    pub(crate) completion: Event,
}

// ── No-op waker ───────────────────────────────────────────────────────

// Frames are polled directly by the kernel; a `Pending` poll always
// means the frame registered itself as a waiter on some event, so the
// waker carries no information and never needs to wake anything.
const NOOP_VTABLE: RawWakerVTable =
    RawWakerVTable::new(noop_clone, noop, noop, noop);

unsafe fn noop_clone(_data: *const ()) -> RawWaker {
    noop_raw_waker()
}

unsafe fn noop(_data: *const ()) {}

const fn noop_raw_waker() -> RawWaker {
    RawWaker::new(ptr::null(), &NOOP_VTABLE)
}

pub(crate) fn noop_waker() -> Waker {
    // Safety: the vtable functions touch no data and the data pointer is
    // null; every contract of RawWaker is trivially upheld.
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

// ── Spawn & resume ────────────────────────────────────────────────────

/// Register a future as a process and schedule its start.
///
/// The body does not run yet: an initial zero-delay event is queued, and
/// the first poll happens when that event is processed. This guarantees
/// a process never executes user code before the simulation reaches its
/// spawn time.
pub(crate) fn spawn<V, F>(ctx: &SimContext, body: F) -> Process<V>
where
    V: 'static,
    F: Future<Output = V> + 'static,
{
    let completion = ValueEvent::new(ctx.clone());
    let done = completion.clone();
    let wrapped = async move {
        done.trigger(body.await);
    };

    let pid = {
        let mut core = ctx.core.borrow_mut();
        let pid = ProcessId(core.next_process_id);
        core.next_process_id += 1;
        core.processes.insert(
            pid,
            ProcessFrame {
                future: Box::pin(wrapped),
                completion: completion.event(),
            },
        );
        pid
    };
    tracing::debug!(process = %pid, "process spawned");

    let start = ctx.timeout(0.0);
    start.add_waiter(pid);

    Process { completion }
}

/// Resume a parked process, or destroy it if it was aborted while
/// suspended.
///
/// Called from `Event::process` for each waiter. The frame is taken out
/// of the core for the duration of the poll, so code running inside the
/// body may freely spawn, trigger, and abort without re-entering this
/// frame.
pub(crate) fn resume(ctx: &SimContext, pid: ProcessId) {
    let mut frame = {
        let mut core = ctx.core.borrow_mut();
        match core.processes.remove(&pid) {
            Some(frame) => frame,
            // Already destroyed, e.g. by an abort earlier in this same
            // event's waiter list.
            None => return,
        }
    };

    if frame.completion.aborted() {
        tracing::debug!(process = %pid, "destroying aborted process");
        drop(frame);
        return;
    }

    {
        let mut core = ctx.core.borrow_mut();
        core.current = Some(pid);
        core.current_aborted = false;
    }
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let poll = frame.future.as_mut().poll(&mut cx);

    let doomed = {
        let mut core = ctx.core.borrow_mut();
        core.current = None;
        let doomed = core.current_aborted;
        core.current_aborted = false;
        doomed
    };

    match poll {
        // The wrapper already triggered the completion event.
        Poll::Ready(()) => drop(frame),
        Poll::Pending => {
            if doomed || frame.completion.aborted() {
                // The body awaited an aborted event, or aborted itself
                // mid-run. Either way it must not run again.
                tracing::debug!(process = %pid, "destroying doomed process");
                drop(frame);
            } else {
                ctx.core.borrow_mut().processes.insert(pid, frame);
            }
        }
    }
}

// ── Process handle ────────────────────────────────────────────────────

/// Completion handle of a spawned process.
///
/// Behaves like the event that fires when the process body returns; for
/// a value-returning body the return value rides on the event. Aborting
/// the handle destroys the suspended body at its next resumption point.
pub struct Process<V = ()> {
    completion: ValueEvent<V>,
}

impl<V> Process<V> {
    /// Abort the process. The suspended body is destroyed; no further
    /// code in it runs.
    pub fn abort(&self) {
        self.completion.abort();
    }

    /// Whether the process has neither completed nor been aborted.
    pub fn pending(&self) -> bool {
        self.completion.pending()
    }

    /// Whether the process has completed (its completion event is
    /// triggered or processed).
    pub fn triggered(&self) -> bool {
        self.completion.triggered()
    }

    /// Whether the completion event has been processed.
    pub fn processed(&self) -> bool {
        self.completion.processed()
    }

    /// Whether the process was aborted.
    pub fn aborted(&self) -> bool {
        self.completion.aborted()
    }

    /// Attach a callback to the completion event.
    pub fn add_callback(&self, cb: impl FnOnce() + 'static) {
        self.completion.add_callback(cb);
    }

    /// The process's return value.
    ///
    /// # Panics
    /// Panics if the process has not completed.
    pub fn value(&self) -> V
    where
        V: Clone,
    {
        self.completion.value()
    }
}

impl<V> Clone for Process<V> {
    fn clone(&self) -> Self {
        Process {
            completion: self.completion.clone(),
        }
    }
}

impl<V> std::fmt::Debug for Process<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("completion", &self.completion.event())
            .finish()
    }
}

impl<V> Awaitable for Process<V> {
    fn event(&self) -> Event {
        self.completion.event()
    }
}

/// Awaiting a process yields its return value when the body completes.
impl<V: Clone> Future for Process<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        Pin::new(&mut self.get_mut().completion).poll(cx)
    }
}

/// `p | other`: fires when either completes.
impl<V, R: Awaitable> BitOr<R> for Process<V> {
    type Output = Event;

    fn bitor(self, other: R) -> Event {
        self.event() | other.event()
    }
}

/// `p & other`: fires when both complete.
impl<V, R: Awaitable> BitAnd<R> for Process<V> {
    type Output = Event;

    fn bitand(self, other: R) -> Event {
        self.event() & other.event()
    }
}
