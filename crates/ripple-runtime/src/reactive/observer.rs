#![forbid(unsafe_code)]

//! Observer handles.
//!
//! An [`Observer`] owns a [`ChangeBus`] plus the path proxies it has
//! installed on the buses of observed children. Every converted node has
//! one, and user code creates root observers with [`Observer::new`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use ripple_core::change::{self, GET, MUTATE, SET};
use ripple_core::{Change, ChangeBus, Listener, NodeId, Subscription, hook_event};

/// Listeners one observer installed on a child's bus to re-emit that child's
/// changes under a path prefix.
pub(crate) struct PathProxy {
    pub(crate) get: Listener<Change>,
    pub(crate) set: Listener<Change>,
    pub(crate) mutate: Listener<Change>,
}

impl PathProxy {
    fn attach(&self, bus: &ChangeBus) {
        bus.on(GET, Rc::clone(&self.get))
            .on(SET, Rc::clone(&self.set))
            .on(MUTATE, Rc::clone(&self.mutate));
    }

    fn detach(&self, bus: &ChangeBus) {
        bus.off(GET, &self.get)
            .off(SET, &self.set)
            .off(MUTATE, &self.mutate);
    }
}

/// A proxy together with the child bus it is registered on.
struct Installed {
    proxy: PathProxy,
    bus: Weak<ChangeBus>,
}

impl Installed {
    fn detach(&self) {
        if let Some(bus) = self.bus.upgrade() {
            self.proxy.detach(&bus);
        }
    }
}

pub(crate) struct ObserverInner {
    bus: Rc<ChangeBus>,
    proxies: RefCell<AHashMap<(String, NodeId), Installed>>,
}

impl Drop for ObserverInner {
    // Proxies hold the observer weakly and go inert once it is gone; take
    // them off the child buses so those lists do not grow with churn.
    fn drop(&mut self) {
        for (_, installed) in self.proxies.get_mut().drain() {
            installed.detach();
        }
    }
}

/// Shared handle to an event bus that receives path-addressed changes.
///
/// Cloning an `Observer` creates a new handle to the **same** bus.
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

/// Non-owning observer handle held by proxies, so a child never keeps its
/// parent's observer alive.
#[derive(Clone)]
pub(crate) struct WeakObserver(Weak<ObserverInner>);

impl WeakObserver {
    pub(crate) fn upgrade(&self) -> Option<Observer> {
        self.0.upgrade().map(|inner| Observer { inner })
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                bus: Rc::new(ChangeBus::new()),
                proxies: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// The underlying bus.
    #[must_use]
    pub fn bus(&self) -> &Rc<ChangeBus> {
        &self.inner.bus
    }

    pub(crate) fn downgrade(&self) -> WeakObserver {
        WeakObserver(Rc::downgrade(&self.inner))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Emit `change` under its own event name.
    pub fn send(&self, change: Change) {
        change::send(&self.inner.bus, change);
    }

    /// Register `f` for every change delivered on `event`.
    ///
    /// The returned listener can be passed to [`Observer::off`].
    pub fn on(&self, event: &str, f: impl Fn(&Change) + 'static) -> Listener<Change> {
        self.inner.bus.on_fn(event, move |_, args| {
            for change in args {
                f(change);
            }
        })
    }

    pub fn off(&self, event: &str, listener: &Listener<Change>) {
        self.inner.bus.off(event, listener);
    }

    /// Like [`Observer::on`], but the listener is removed when the guard drops.
    pub fn subscribe(&self, event: &str, f: impl Fn(&Change) + 'static) -> Subscription {
        self.inner.bus.subscribe(event, move |_, args| {
            for change in args {
                f(change);
            }
        })
    }

    /// Fire the lifecycle event `hook:<name>`.
    pub fn emit_hook(&self, name: &str) {
        self.inner.bus.emit(&hook_event(name), &[]);
    }

    /// Run `f` each time `hook:<name>` fires.
    pub fn on_hook(&self, name: &str, f: impl Fn() + 'static) -> Listener<Change> {
        self.inner.bus.on_fn(hook_event(name), move |_, _| f())
    }

    /// Number of children this observer currently proxies.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.inner.proxies.borrow().len()
    }

    /// Whether a proxy for `node` under `raw_path` is installed.
    #[must_use]
    pub fn has_proxy(&self, raw_path: &str, node: NodeId) -> bool {
        self.inner
            .proxies
            .borrow()
            .contains_key(&(raw_path.to_string(), node))
    }

    /// Install `proxy` on `child_bus`, replacing any proxy previously
    /// installed for the same path and node.
    pub(crate) fn attach_proxy(
        &self,
        raw_path: &str,
        node: NodeId,
        proxy: PathProxy,
        child_bus: &Rc<ChangeBus>,
    ) {
        proxy.attach(child_bus);
        let installed = Installed {
            proxy,
            bus: Rc::downgrade(child_bus),
        };
        let previous = self
            .inner
            .proxies
            .borrow_mut()
            .insert((raw_path.to_string(), node), installed);
        if let Some(previous) = previous {
            previous.detach();
        }
    }

    /// Remove the proxy for `node` under `raw_path`. Returns whether one was
    /// installed.
    pub(crate) fn detach_proxy(&self, raw_path: &str, node: NodeId) -> bool {
        let removed = self
            .inner
            .proxies
            .borrow_mut()
            .remove(&(raw_path.to_string(), node));
        match removed {
            Some(installed) => {
                installed.detach();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("bus", &self.inner.bus)
            .field("proxies", &self.proxy_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn send_reaches_listeners_by_event() {
        let observer = Observer::new();
        let sets = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&sets);
        observer.on(SET, move |change| s.borrow_mut().push(change.key().to_string()));
        observer.send(Change::set("a", 1, false));
        observer.send(Change::get("b"));
        assert_eq!(*sets.borrow(), vec!["a"]);
    }

    #[test]
    fn off_removes_listener() {
        let observer = Observer::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let listener = observer.on(SET, move |_| h.set(h.get() + 1));
        observer.send(Change::set("a", 1, false));
        observer.off(SET, &listener);
        observer.send(Change::set("a", 2, false));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscription_guard_unregisters() {
        let observer = Observer::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = observer.subscribe(SET, move |_| h.set(h.get() + 1));
        observer.send(Change::set("a", 1, false));
        drop(sub);
        observer.send(Change::set("a", 2, false));
        assert_eq!(hits.get(), 1);
        assert!(!observer.bus().has_listeners(SET));
    }

    #[test]
    fn hooks_fire_by_name() {
        let observer = Observer::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        observer.on_hook("attached", move || h.set(h.get() + 1));
        observer.emit_hook("attached");
        observer.emit_hook("detached");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_a_root_observer_removes_its_proxies() {
        let graph = crate::reactive::Graph::new();
        let child = graph.new_object([("x", 1)]);
        let root = graph.new_object([("child", child.clone())]);
        let observer = Observer::new();
        graph.observe(&root, "", &observer);

        let bus_of = |value: &ripple_core::Value| {
            Rc::clone(graph.observer_of(value.as_node().unwrap()).unwrap().bus())
        };
        let (root_bus, child_bus) = (bus_of(&root), bus_of(&child));
        let (root_sets, child_sets) = (root_bus.listener_count(SET), child_bus.listener_count(SET));
        let clone = observer.clone();

        drop(observer);
        assert_eq!(root_bus.listener_count(SET), root_sets, "a live clone keeps it");
        drop(clone);
        assert_eq!(root_bus.listener_count(SET), root_sets - 1);
        assert_eq!(child_bus.listener_count(SET), child_sets, "node-level proxies stay");
    }

    #[test]
    fn clones_share_a_bus() {
        let a = Observer::new();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Observer::new()));
        assert!(a.downgrade().upgrade().is_some());
    }
}
