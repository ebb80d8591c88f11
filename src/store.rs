/// Bounded store: a FIFO of values pairing producer and consumer
/// events.
///
/// `put` returns an event that fires once the value is accepted under
/// the capacity limit; `get` returns a value event that fires with the
/// next value. Matching is FIFO on both sides. Each completion re-runs
/// the opposite drain through its callback, so a consumed slot is
/// refilled from a blocked producer in the same time step.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::event::{Event, ValueEvent};
use crate::simulation::SimContext;

struct StoreState<V> {
    /// Values currently held, oldest first.
    values: VecDeque<V>,

    /// Pending get events, oldest first.
    gets: VecDeque<ValueEvent<V>>,

    /// Pending put events with the values they carry, oldest first.
    puts: VecDeque<(Event, V)>,

    /// Maximum number of values held at once.
    capacity: usize,
}

/// A shared bounded FIFO of values.
///
/// Cloning yields another handle to the same store.
pub struct Store<V> {
    ctx: SimContext,
    state: Rc<RefCell<StoreState<V>>>,
}

impl<V: 'static> Store<V> {
    /// Create an unbounded store.
    pub fn new(ctx: &SimContext) -> Self {
        Self::with_capacity(ctx, usize::MAX)
    }

    /// Create a store holding at most `capacity` values.
    pub fn with_capacity(ctx: &SimContext, capacity: usize) -> Self {
        Store {
            ctx: ctx.clone(),
            state: Rc::new(RefCell::new(StoreState {
                values: VecDeque::new(),
                gets: VecDeque::new(),
                puts: VecDeque::new(),
                capacity,
            })),
        }
    }

    /// Retrieve the next value. The returned event fires with the value
    /// once one is available, which may be immediately.
    pub fn get(&self) -> ValueEvent<V> {
        let ev = self.ctx.value_event();

        // A completed get frees a slot: pull in a blocked producer.
        let store = self.clone();
        ev.add_callback(move || store.drain_puts());

        self.state.borrow_mut().gets.push_back(ev.clone());
        self.drain_gets();
        ev
    }

    /// Add a value. The returned event fires once the store has
    /// capacity and the value is accepted, which may be immediately.
    pub fn put(&self, value: V) -> Event {
        let ev = self.ctx.event();

        // A completed put means a value arrived: feed a blocked consumer.
        let store = self.clone();
        ev.add_callback(move || store.drain_gets());

        self.state.borrow_mut().puts.push_back((ev.clone(), value));
        self.drain_puts();
        ev
    }

    /// Values currently held.
    pub fn len(&self) -> usize {
        self.state.borrow().values.len()
    }

    /// Whether the store holds no values.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().values.is_empty()
    }

    /// Maximum number of values held at once.
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Match held values with pending gets. Aborted gets are skipped
    /// without consuming a value.
    fn drain_gets(&self) {
        loop {
            let (ev, value) = {
                let mut state = self.state.borrow_mut();
                if state.values.is_empty() || state.gets.is_empty() {
                    break;
                }
                let ev = state.gets.pop_front().unwrap();
                if ev.aborted() {
                    continue;
                }
                let value = state.values.pop_front().unwrap();
                (ev, value)
            };
            ev.trigger(value);
        }
    }

    /// Accept pending puts while there is capacity. Aborted puts are
    /// skipped and their values discarded.
    fn drain_puts(&self) {
        loop {
            let ev = {
                let mut state = self.state.borrow_mut();
                if state.values.len() >= state.capacity || state.puts.is_empty() {
                    break;
                }
                let (ev, value) = state.puts.pop_front().unwrap();
                if ev.aborted() {
                    continue;
                }
                state.values.push_back(value);
                ev
            };
            ev.trigger();
        }
    }
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Store {
            ctx: self.ctx.clone(),
            state: self.state.clone(),
        }
    }
}

impl<V> std::fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Store")
            .field("values", &state.values.len())
            .field("gets", &state.gets.len())
            .field("puts", &state.puts.len())
            .field("capacity", &state.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{Simulation, VirtualTime};

    #[test]
    fn test_put_then_get_immediate() {
        let mut sim = Simulation::new();
        let store = Store::new(&sim.handle());
        let put = store.put(7u32);
        assert!(put.triggered());
        assert_eq!(store.len(), 1);

        let get = store.get();
        assert!(get.triggered());
        assert!(store.is_empty());
        sim.run();
        assert_eq!(get.value(), 7);
    }

    #[test]
    fn test_get_before_put_waits() {
        let mut sim = Simulation::new();
        let store = Store::new(&sim.handle());
        let get = store.get();
        assert!(get.pending());
        store.put("hello");
        sim.run();
        assert_eq!(get.value(), "hello");
    }

    #[test]
    fn test_capacity_blocks_put() {
        let mut sim = Simulation::new();
        let store = Store::with_capacity(&sim.handle(), 1);
        let first = store.put(1);
        let second = store.put(2);
        assert!(first.triggered());
        assert!(second.pending());
        assert_eq!(store.len(), 1);

        // Consuming one value lets the blocked put through.
        let get = store.get();
        sim.run();
        assert_eq!(get.value(), 1);
        assert!(second.processed());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fifo_pairing() {
        let mut sim = Simulation::new();
        let store = Store::new(&sim.handle());
        for i in 0..4u32 {
            store.put(i);
        }
        let gets: Vec<_> = (0..4).map(|_| store.get()).collect();
        sim.run();
        let got: Vec<u32> = gets.iter().map(|g| g.value()).collect();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_aborted_get_does_not_consume() {
        let mut sim = Simulation::new();
        let store = Store::new(&sim.handle());
        let dead = store.get();
        dead.abort();
        let live = store.get();
        store.put(42);
        sim.run();
        assert_eq!(live.value(), 42);
        assert!(dead.aborted());
    }

    #[test]
    fn test_aborted_put_discards_value() {
        let mut sim = Simulation::new();
        let store = Store::with_capacity(&sim.handle(), 1);
        let first = store.put(1);
        let dead = store.put(2);
        let third = store.put(3);
        assert!(first.triggered());
        dead.abort();

        let a = store.get();
        let b = store.get();
        sim.run();
        assert_eq!(a.value(), 1);
        // The aborted put's value never enters the store.
        assert_eq!(b.value(), 3);
        assert!(third.processed());
    }

    #[test]
    fn test_slow_consumer_pipeline() {
        let mut sim = Simulation::new();
        let ctx = sim.handle();
        let store = Store::with_capacity(&ctx, 1);
        let deliveries = Rc::new(RefCell::new(Vec::new()));

        {
            let store = store.clone();
            let ctx = ctx.clone();
            sim.spawn(async move {
                for i in 0..3u32 {
                    store.put(i).await;
                    tracing::trace!(value = i, at = %ctx.now(), "produced");
                }
            });
        }
        {
            let store = store.clone();
            let deliveries = deliveries.clone();
            sim.spawn(async move {
                for _ in 0..3 {
                    ctx.timeout(5.0).await;
                    let v = store.get().await;
                    deliveries.borrow_mut().push((ctx.now(), v));
                }
            });
        }

        sim.run();
        assert_eq!(
            *deliveries.borrow(),
            vec![
                (VirtualTime::new(5.0), 0),
                (VirtualTime::new(10.0), 1),
                (VirtualTime::new(15.0), 2),
            ]
        );
    }
}
