/// Counted resource: a semaphore with FIFO, abortable waiters.
///
/// `request` returns an event that fires when a unit is granted;
/// `release` returns a unit and wakes the oldest live waiter. A waiter
/// that aborts its request event leaves the queue silently, so racing a
/// request against a timeout and aborting the loser is safe.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::event::Event;
use crate::simulation::SimContext;

struct ResourceState {
    /// Units currently free.
    available: u64,

    /// Pending request events, oldest first.
    waiters: VecDeque<Event>,
}

/// A counted resource shared between processes.
///
/// Cloning yields another handle to the same resource.
#[derive(Clone)]
pub struct Resource {
    ctx: SimContext,
    state: Rc<RefCell<ResourceState>>,
}

impl Resource {
    /// Create a resource with `available` free units.
    pub fn new(ctx: &SimContext, available: u64) -> Self {
        Resource {
            ctx: ctx.clone(),
            state: Rc::new(RefCell::new(ResourceState {
                available,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Request one unit. The returned event fires once the unit is
    /// granted, which may be immediately. Abort the event to leave the
    /// queue.
    pub fn request(&self) -> Event {
        let ev = self.ctx.event();
        self.state.borrow_mut().waiters.push_back(ev.clone());
        self.drain();
        ev
    }

    /// Return one unit and grant it to the oldest live waiter, if any.
    ///
    /// Releasing more than was ever requested is allowed and simply
    /// raises the available count.
    pub fn release(&self) {
        self.state.borrow_mut().available += 1;
        self.drain();
    }

    /// Units currently free.
    pub fn available(&self) -> u64 {
        self.state.borrow().available
    }

    /// Requests still waiting for a unit (aborted entries included
    /// until a drain pass reaches them).
    pub fn queued(&self) -> usize {
        self.state.borrow().waiters.len()
    }

    /// Grant units to waiters while both are available. Aborted waiters
    /// are skipped and dropped.
    fn drain(&self) {
        loop {
            let ev = {
                let mut state = self.state.borrow_mut();
                if state.available == 0 || state.waiters.is_empty() {
                    break;
                }
                state.waiters.pop_front().unwrap()
            };
            if ev.aborted() {
                continue;
            }
            ev.trigger();
            self.state.borrow_mut().available -= 1;
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Resource")
            .field("available", &state.available)
            .field("queued", &state.waiters.len())
            .finish()
    }
}
