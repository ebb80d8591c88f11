/// Deterministic event scheduler.
///
/// Uses a `BinaryHeap` with reversed `Ord` on `ScheduledEvent` to act as
/// a min-heap keyed by `(fire_time, event_id)`. Because event IDs are
/// strictly increasing and the heap order is total, two runs that make
/// the same scheduling calls always dispatch in the same order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::Event;
use crate::time::VirtualTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly-increasing insertion identifier.
///
/// Minted whenever an event is pushed onto the scheduler. Two events
/// scheduled at the same `VirtualTime` are dispatched in `EventId`
/// order, which is exactly the order of the scheduling calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw u64 into an `EventId`.
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly-increasing event-ID generator.
///
/// Each simulation owns exactly one of these; the kernel is
/// single-threaded, so the counter is trivially deterministic.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Scheduled Event ───────────────────────────────────────────────────

/// One entry in the scheduler: an event and the time it fires at.
///
/// Holds a handle to the event, so an event stays alive while it sits
/// in the queue even if every user-side handle is dropped.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// The virtual time at which the event is dispatched.
    pub at: VirtualTime,

    /// Insertion ID minted when the entry was pushed.
    pub id: EventId,

    /// The event to process.
    pub event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for ScheduledEvent {}

/// Ordering: smallest `(at, id)` first.
///
/// Rust's `BinaryHeap` is a *max*-heap, so the natural ordering is
/// reversed here to turn it into a min-heap.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────

/// The time-ordered event queue.
///
/// Owns the heap and the ID generator. All scheduling goes through this
/// struct to ensure monotonic IDs and deterministic dispatch order.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Min-heap (via reversed Ord on ScheduledEvent).
    queue: BinaryHeap<ScheduledEvent>,

    /// Monotonic event-ID generator.
    id_gen: EventIdGen,
}

impl Scheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Push an event to fire at the given virtual time.
    ///
    /// Returns the `EventId` assigned to this entry.
    pub fn schedule(&mut self, at: VirtualTime, event: Event) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.push(ScheduledEvent { at, id, event });
        id
    }

    /// Pop the next entry (earliest time, lowest ID).
    ///
    /// Returns `None` when the queue is empty.
    pub fn pop_next(&mut self) -> Option<ScheduledEvent> {
        self.queue.pop()
    }

    /// Peek at the next entry without removing it.
    pub fn peek_next(&self) -> Option<&ScheduledEvent> {
        self.queue.peek()
    }

    /// Returns `true` if the event queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of queued entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns the next event ID that will be assigned.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Drop every queued entry. Used by simulation shutdown.
    pub(crate) fn clear(&mut self) -> Vec<ScheduledEvent> {
        self.queue.drain().collect()
    }
}
