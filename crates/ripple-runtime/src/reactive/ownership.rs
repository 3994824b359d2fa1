#![forbid(unsafe_code)]

//! Array element ownership.
//!
//! An array owns each watchable element it holds. A change inside an owned
//! element makes every owning array report a root-level change of its own,
//! so listeners on the array see element edits without knowing the index.
//!
//! # Invariants
//!
//! 1. `link` is idempotent per (array, element) pair.
//! 2. An element keeps an array as owner while any copy of it remains in
//!    that array.
//! 3. Owners are notified in the order they were linked.

use ripple_core::{Change, NodeId, Value};

use super::graph::Graph;

impl Graph {
    /// Register `array` as an owner of every watchable item, converting and
    /// watching items that were not yet observable.
    pub fn link(&self, array: NodeId, items: &[Value]) {
        for id in items.iter().filter_map(Value::as_node) {
            if self.kind(id).is_none() {
                continue;
            }
            if !self.convert(id) {
                self.watch(id);
            }
            if let Some(emitter) = self.emitter(id) {
                emitter.add_owner(array);
            }
        }
    }

    /// Drop `array` from the owners of every removed item that the array no
    /// longer contains.
    pub fn unlink(&self, array: NodeId, items: &[Value]) {
        let remaining = self.items(array);
        for id in items.iter().filter_map(Value::as_node) {
            if remaining.contains(&Value::Node(id)) {
                continue;
            }
            if let Some(emitter) = self.emitter(id) {
                emitter.remove_owner(array);
            }
        }
    }

    /// Send a root-level `set` with `propagate = true` on every owner of
    /// `id`.
    ///
    /// Re-entry for a node already propagating is ignored, which keeps arrays
    /// that (directly or indirectly) contain themselves from looping.
    pub fn propagate_change(&self, id: NodeId) {
        if !self.inner.propagating.borrow_mut().insert(id) {
            return;
        }
        let _guard = PropagatingGuard { graph: self, id };
        for owner in self.owners(id) {
            if let Some(observer) = self.observer_of(owner) {
                observer.send(Change::set("", Value::Undefined, true));
            }
        }
    }
}

/// Clears the re-entry mark even when a listener unwinds.
struct PropagatingGuard<'a> {
    graph: &'a Graph,
    id: NodeId,
}

impl Drop for PropagatingGuard<'_> {
    fn drop(&mut self) {
        self.graph.inner.propagating.borrow_mut().remove(&self.id);
    }
}
