#![forbid(unsafe_code)]

//! Named-event publish/subscribe channel.
//!
//! An [`EventBus`] maps event names to ordered listener lists and invokes them
//! with a fixed dispatch context. It is the building block every observer in
//! the runtime is made of.
//!
//! # Invariants
//!
//! 1. Listeners run in registration order.
//! 2. Dispatch iterates a snapshot taken when the event is emitted; `on`/`off`
//!    calls made by a listener never disturb the in-flight iteration.
//! 3. Emitting an event nobody listens to is a no-op.
//! 4. A listener registered with [`once`](EventBus::once) runs at most once,
//!    even when the same event is emitted re-entrantly.
//! 5. A panicking listener does not stop the remaining listeners of the
//!    snapshot. The first panic is resumed once the snapshot is exhausted.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use ripple_core::bus::{EventBus, Listener};
//!
//! let bus: EventBus<i32> = EventBus::new();
//! let total = Rc::new(Cell::new(0));
//! let t = Rc::clone(&total);
//! let add: Listener<i32> = Rc::new(move |_, args| t.set(t.get() + args.iter().sum::<i32>()));
//!
//! bus.on("add", Rc::clone(&add));
//! bus.emit("add", &[1, 2, 3]);
//! assert_eq!(total.get(), 6);
//!
//! bus.off("add", &add);
//! bus.emit("add", &[10]);
//! assert_eq!(total.get(), 6);
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use smallvec::SmallVec;

/// Maximum number of arguments forwarded by [`EventBus::emit`].
pub const FAST_ARITY: usize = 3;

/// A registered callback. Identity is the `Rc` allocation.
pub type Listener<A, C = ()> = Rc<dyn Fn(&C, &[A])>;

struct Entry<A, C> {
    listener: Listener<A, C>,
    /// Present for `once` registrations; flips to `true` on first delivery.
    fired: Option<Rc<Cell<bool>>>,
}

impl<A, C> Clone for Entry<A, C> {
    fn clone(&self) -> Self {
        Self {
            listener: Rc::clone(&self.listener),
            fired: self.fired.clone(),
        }
    }
}

/// Per-object publish/subscribe channel.
///
/// `A` is the argument type passed to listeners, `C` the dispatch context
/// handed to every listener as its first parameter.
pub struct EventBus<A, C = ()> {
    ctx: C,
    events: RefCell<AHashMap<String, Vec<Entry<A, C>>>>,
}

impl<A: 'static, C: Default + 'static> EventBus<A, C> {
    /// Create a bus with a default dispatch context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_context(C::default())
    }
}

impl<A: 'static, C: Default + 'static> Default for EventBus<A, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, C: 'static> EventBus<A, C> {
    /// Create a bus whose listeners receive `ctx` as their dispatch context.
    #[must_use]
    pub fn with_context(ctx: C) -> Self {
        Self {
            ctx,
            events: RefCell::new(AHashMap::new()),
        }
    }

    /// The dispatch context.
    #[must_use]
    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Append `listener` to the list for `event`.
    pub fn on(&self, event: impl Into<String>, listener: Listener<A, C>) -> &Self {
        self.events
            .borrow_mut()
            .entry(event.into())
            .or_default()
            .push(Entry {
                listener,
                fired: None,
            });
        self
    }

    /// Register a closure and return its handle so it can be removed later.
    pub fn on_fn(
        &self,
        event: impl Into<String>,
        f: impl Fn(&C, &[A]) + 'static,
    ) -> Listener<A, C> {
        let listener: Listener<A, C> = Rc::new(f);
        self.on(event, Rc::clone(&listener));
        listener
    }

    /// Append a listener that removes itself before its first invocation.
    ///
    /// [`off`](Self::off) with the same `listener` still finds and removes it.
    pub fn once(&self, event: impl Into<String>, listener: Listener<A, C>) -> &Self {
        self.events
            .borrow_mut()
            .entry(event.into())
            .or_default()
            .push(Entry {
                listener,
                fired: Some(Rc::new(Cell::new(false))),
            });
        self
    }

    /// Remove the first listener for `event` that is `listener`, or a `once`
    /// registration wrapping it. Unknown events and listeners are ignored.
    pub fn off(&self, event: &str, listener: &Listener<A, C>) -> &Self {
        let mut events = self.events.borrow_mut();
        if let Some(list) = events.get_mut(event)
            && let Some(pos) = list
                .iter()
                .position(|entry| Rc::ptr_eq(&entry.listener, listener))
        {
            list.remove(pos);
        }
        self
    }

    /// Remove every listener registered for `event`.
    pub fn off_event(&self, event: &str) -> &Self {
        self.events.borrow_mut().remove(event);
        self
    }

    /// Remove every listener for every event.
    pub fn off_all(&self) -> &Self {
        self.events.borrow_mut().clear();
        self
    }

    /// Number of listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.events.borrow().get(event).map_or(0, Vec::len)
    }

    /// Whether `event` has at least one listener.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    /// Names of events that currently have listeners.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Fast-path dispatch with at most [`FAST_ARITY`] arguments.
    ///
    /// Arguments beyond the fixed arity are not forwarded.
    pub fn emit(&self, event: &str, args: &[A]) -> &Self {
        let args = &args[..args.len().min(FAST_ARITY)];
        self.dispatch(event, args);
        self
    }

    /// Dispatch with an arbitrary number of arguments.
    pub fn apply_emit(&self, event: &str, args: impl IntoIterator<Item = A>) -> &Self {
        let args: Vec<A> = args.into_iter().collect();
        self.dispatch(event, &args);
        self
    }

    fn dispatch(&self, event: &str, args: &[A]) {
        let snapshot: SmallVec<[Entry<A, C>; 4]> = match self.events.borrow().get(event) {
            Some(list) if !list.is_empty() => list.iter().cloned().collect(),
            _ => return,
        };

        let mut first_panic: Option<Box<dyn Any + Send>> = None;
        for entry in &snapshot {
            if let Some(fired) = &entry.fired {
                if fired.replace(true) {
                    continue;
                }
                self.remove_fired(event, fired);
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (entry.listener)(&self.ctx, args);
            }));
            if let Err(payload) = outcome {
                tracing::error!(event, "listener panicked; continuing dispatch");
                first_panic.get_or_insert(payload);
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    fn remove_fired(&self, event: &str, fired: &Rc<Cell<bool>>) {
        let mut events = self.events.borrow_mut();
        if let Some(list) = events.get_mut(event) {
            list.retain(|entry| {
                entry
                    .fired
                    .as_ref()
                    .is_none_or(|other| !Rc::ptr_eq(other, fired))
            });
        }
    }

    /// Register `f` for `event` and return a guard that removes it on drop.
    pub fn subscribe(
        self: &Rc<Self>,
        event: impl Into<String>,
        f: impl Fn(&C, &[A]) + 'static,
    ) -> Subscription {
        let event = event.into();
        let listener = self.on_fn(event.clone(), f);
        let weak: Weak<Self> = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(bus) = weak.upgrade() {
                bus.off(&event, &listener);
            }
        })
    }
}

impl<A, C> fmt::Debug for EventBus<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events.borrow();
        let mut map = f.debug_map();
        for (name, list) in events.iter() {
            map.entry(name, &list.len());
        }
        map.finish()
    }
}

/// RAII guard that unregisters a listener when dropped.
#[must_use = "dropping a Subscription immediately removes its listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap an arbitrary release action.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Keep the listener registered for the lifetime of its bus.
    pub fn detach(mut self) {
        self.release = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
