//! Property-based invariant tests for the event bus and dotted paths.
//!
//! 1. Listeners run in registration order.
//! 2. A `once` listener runs at most once, however often the event fires.
//! 3. `off` removes exactly one registration of a listener.
//! 4. Listeners added during dispatch do not run in that dispatch.
//! 5. `emit` forwards at most `FAST_ARITY` arguments.
//! 6. `join` and `segments` agree for non-empty segments.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use ripple_core::path::{join, segments};
use ripple_core::{EventBus, FAST_ARITY, Listener};

// ── Helpers ─────────────────────────────────────────────────────────────

type Log = Rc<RefCell<Vec<usize>>>;

fn tagged(log: &Log, tag: usize) -> Listener<u8> {
    let log = Rc::clone(log);
    Rc::new(move |_: &(), _: &[u8]| log.borrow_mut().push(tag))
}

fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

// ═════════════════════════════════════════════════════════════════════════
// 1–4. Dispatch
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn registration_order_is_dispatch_order(count in 1usize..16) {
        let bus: EventBus<u8> = EventBus::new();
        let log: Log = Rc::default();
        for tag in 0..count {
            bus.on("e", tagged(&log, tag));
        }
        bus.emit("e", &[]);
        prop_assert_eq!(&*log.borrow(), &(0..count).collect::<Vec<_>>());
    }

    #[test]
    fn once_runs_at_most_once(emits in 0usize..8) {
        let bus: EventBus<u8> = EventBus::new();
        let log: Log = Rc::default();
        bus.once("e", tagged(&log, 1));
        for _ in 0..emits {
            bus.emit("e", &[]);
        }
        prop_assert_eq!(log.borrow().len(), emits.min(1));
        prop_assert_eq!(bus.listener_count("e"), usize::from(emits == 0));
    }

    #[test]
    fn off_removes_one_registration(copies in 1usize..6) {
        let bus: EventBus<u8> = EventBus::new();
        let log: Log = Rc::default();
        let listener = tagged(&log, 7);
        for _ in 0..copies {
            bus.on("e", Rc::clone(&listener));
        }
        bus.off("e", &listener);
        bus.emit("e", &[]);
        prop_assert_eq!(log.borrow().len(), copies - 1);
    }

    #[test]
    fn additions_during_dispatch_wait_for_the_next_emit(adds in 1usize..6) {
        let bus: Rc<EventBus<u8>> = Rc::new(EventBus::new());
        let log: Log = Rc::default();
        let weak = Rc::downgrade(&bus);
        let l = Rc::clone(&log);
        bus.once("e", Rc::new(move |_: &(), _: &[u8]| {
            if let Some(bus) = weak.upgrade() {
                for tag in 0..adds {
                    bus.on("e", tagged(&l, tag));
                }
            }
        }));
        bus.emit("e", &[]);
        prop_assert!(log.borrow().is_empty());
        bus.emit("e", &[]);
        prop_assert_eq!(log.borrow().len(), adds);
    }

    #[test]
    fn emit_truncates_to_fast_arity(args in proptest::collection::vec(any::<u8>(), 0..8)) {
        let bus: EventBus<u8> = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        bus.on_fn("e", move |_, got| s.borrow_mut().extend_from_slice(got));
        bus.emit("e", &args);
        prop_assert_eq!(seen.borrow().len(), args.len().min(FAST_ARITY));

        seen.borrow_mut().clear();
        bus.apply_emit("e", args.iter().copied());
        prop_assert_eq!(&*seen.borrow(), &args);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Paths
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn join_then_split(parts in proptest::collection::vec(segment_strategy(), 0..6)) {
        let path = parts.iter().fold(String::new(), |acc, part| join(&acc, part));
        let split: Vec<&str> = segments(&path).collect();
        prop_assert_eq!(split, parts.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
