//! Property-based laws of the kernel.
//!
//! Randomized checks of the ordering, fairness, and idempotence
//! guarantees: dispatch order is total on `(time, id)`, `any_of` fires
//! at the minimum and `all_of` at the maximum input time, resources are
//! FIFO, stores pair puts and gets in order, and redundant
//! trigger/abort calls are no-ops.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use kairos::{Resource, Simulation, Store, VirtualTime};

/// Delays drawn on a coarse grid so equal fire times are common and the
/// insertion-id tiebreak actually gets exercised.
fn delays(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec((0u32..40).prop_map(|d| d as f64 / 4.0), 1..max_len)
}

proptest! {
    #[test]
    fn dispatch_order_is_total_on_time_then_id(delays in delays(24)) {
        let mut sim = Simulation::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (i, &d) in delays.iter().enumerate() {
            let fired = fired.clone();
            let ctx = sim.handle();
            sim.timeout(d).add_callback(move || {
                fired.borrow_mut().push((ctx.now(), i));
            });
        }
        sim.run();

        let fired = fired.borrow();
        prop_assert_eq!(fired.len(), delays.len());
        for window in fired.windows(2) {
            let ((t1, i1), (t2, i2)) = (window[0], window[1]);
            prop_assert!(t1 <= t2, "time went backward");
            if t1 == t2 {
                // Same fire time: creation order wins.
                prop_assert!(i1 < i2, "insertion-order tiebreak violated");
            }
        }
    }

    #[test]
    fn any_of_fires_at_the_minimum(delays in delays(8)) {
        let mut sim = Simulation::new();
        let events: Vec<_> = delays.iter().map(|&d| sim.timeout(d)).collect();
        let any = sim.any_of(&events);
        let fired_at = Rc::new(RefCell::new(None));
        {
            let fired_at = fired_at.clone();
            let ctx = sim.handle();
            any.add_callback(move || *fired_at.borrow_mut() = Some(ctx.now()));
        }
        sim.run();

        let min = delays.iter().cloned().fold(f64::INFINITY, f64::min);
        prop_assert_eq!(*fired_at.borrow(), Some(VirtualTime::new(min)));
    }

    #[test]
    fn all_of_fires_at_the_maximum(delays in delays(8)) {
        let mut sim = Simulation::new();
        let events: Vec<_> = delays.iter().map(|&d| sim.timeout(d)).collect();
        let all = sim.all_of(&events);
        let fired_at = Rc::new(RefCell::new(None));
        {
            let fired_at = fired_at.clone();
            let ctx = sim.handle();
            all.add_callback(move || *fired_at.borrow_mut() = Some(ctx.now()));
        }
        sim.run();

        let max = delays.iter().cloned().fold(0.0, f64::max);
        prop_assert_eq!(*fired_at.borrow(), Some(VirtualTime::new(max)));
    }

    #[test]
    fn resource_serves_in_request_order(
        waiters in 1usize..12,
        aborted in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let mut sim = Simulation::new();
        let res = Resource::new(&sim.handle(), 0);
        let served = Rc::new(RefCell::new(Vec::new()));

        let mut requests = Vec::new();
        for i in 0..waiters {
            let req = res.request();
            let served = served.clone();
            req.add_callback(move || served.borrow_mut().push(i));
            requests.push(req);
        }
        for (i, req) in requests.iter().enumerate() {
            if aborted[i] {
                req.abort();
            }
        }
        for _ in 0..waiters {
            res.release();
        }
        sim.run();

        let expected: Vec<usize> =
            (0..waiters).filter(|&i| !aborted[i]).collect();
        prop_assert_eq!(served.borrow().clone(), expected);
    }

    #[test]
    fn store_pairs_puts_and_gets_fifo(
        items in 1usize..10,
        capacity in 1usize..4,
    ) {
        let mut sim = Simulation::new();
        let store = Store::with_capacity(&sim.handle(), capacity);
        for i in 0..items {
            store.put(i);
        }
        let gets: Vec<_> = (0..items).map(|_| store.get()).collect();
        sim.run();

        let got: Vec<usize> = gets.iter().map(|g| g.value()).collect();
        let expected: Vec<usize> = (0..items).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn trigger_and_abort_are_idempotent(first_abort in any::<bool>(), extra in 1usize..4) {
        let mut sim = Simulation::new();
        let ev = sim.event();
        if first_abort {
            ev.abort();
        } else {
            ev.trigger();
        }
        // Redundant calls in any combination change nothing.
        for _ in 0..extra {
            ev.trigger();
            ev.abort();
        }
        sim.run();

        if first_abort {
            prop_assert!(ev.aborted());
            prop_assert_eq!(sim.events_processed(), 0);
        } else {
            prop_assert!(ev.processed());
            prop_assert_eq!(sim.events_processed(), 1);
        }
    }

    #[test]
    fn heap_entries_never_fire_before_now(delays in delays(16)) {
        let mut sim = Simulation::new();
        let mut last = VirtualTime::ZERO;
        for &d in &delays {
            sim.timeout(d);
        }
        while !sim.is_empty() {
            sim.step();
            prop_assert!(sim.now() >= last);
            last = sim.now();
        }
    }
}
