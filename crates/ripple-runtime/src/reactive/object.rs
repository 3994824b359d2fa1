#![forbid(unsafe_code)]

//! Property interception on objects.
//!
//! Writes go through [`ObjRef`]. A write to a tracked key detaches the old
//! value from the object's observer, carries the old value's key layout over
//! to the new value, stores it and emits `set`. Untracked keys are plain
//! storage.

use ripple_core::path::join;
use ripple_core::{Change, NodeId, Value};

use super::graph::{Graph, NodeData, NodeKind};

/// Borrowed view of an object node.
#[derive(Clone, Copy)]
pub struct ObjRef<'g> {
    graph: &'g Graph,
    id: NodeId,
}

impl Graph {
    /// View `id` as an object, if it is one.
    #[must_use]
    pub fn object(&self, id: NodeId) -> Option<ObjRef<'_>> {
        (self.kind(id) == Some(NodeKind::Object)).then_some(ObjRef { graph: self, id })
    }

    pub(crate) fn store(&self, id: NodeId, key: &str, value: Value) {
        self.with_node_mut(id, |node| {
            if let NodeData::Object(map) = &mut node.data {
                map.insert(key.to_string(), value);
            }
        });
    }

    /// Install an accessor for `key` on a converted object and announce its
    /// current value. Reserved keys and unconverted objects are skipped.
    pub(crate) fn install_accessor(&self, id: NodeId, key: &str, propagate: bool) {
        if self.is_reserved_key(key) {
            return;
        }
        let Some(emitter) = self.emitter(id) else {
            return;
        };
        emitter.track(key);
        let value = self.get(id, key).unwrap_or_default();
        self.init_key(id, key, value, propagate);
    }

    /// Store `value` under a tracked key, announce it, and start observing it
    /// under `key`.
    pub(crate) fn init_key(&self, id: NodeId, key: &str, value: Value, propagate: bool) {
        self.store(id, key, value.clone());
        let Some(emitter) = self.emitter(id) else {
            return;
        };
        let observer = emitter.observer().clone();
        observer.send(Change::set(key, value.clone(), propagate));
        if self.config().emit_length_events
            && let Some(child) = value.as_node()
            && self.kind(child) == Some(NodeKind::Array)
        {
            observer.send(Change::set(join(key, "length"), self.len(child), propagate));
        }
        self.observe(&value, key, &observer);
    }
}

impl<'g> ObjRef<'g> {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Raw read; `Undefined` for missing keys. Use a
    /// [`Collection`](super::Collection) to record reads.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.graph.get(self.id, key).unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.graph.contains_key(self.id, key)
    }

    #[must_use]
    pub fn is_tracked(&self, key: &str) -> bool {
        self.graph.is_tracked(self.id, key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.graph.keys(self.id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len(self.id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `key`.
    ///
    /// On a tracked key this unobserves the old value, copies its key layout
    /// onto the new value, stores the new value, emits `set` with
    /// `propagate = true` and observes the new value. Any other key is
    /// stored silently; use [`ObjRef::add`] to start tracking a new key.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !self.is_tracked(key) {
            self.graph.store(self.id, key, value);
            return;
        }
        let Some(observer) = self.graph.observer_of(self.id) else {
            return;
        };
        let old = self.get(key);
        self.graph.unobserve(&old, key, &observer);
        self.graph.copy_paths(&value, &old);
        self.graph.init_key(self.id, key, value, true);
    }

    /// Add a new key. Returns `false` (and changes nothing) if the key is
    /// already present.
    ///
    /// On a converted object the key becomes tracked and a `set` is emitted.
    pub fn add(&self, key: &str, value: impl Into<Value>) -> bool {
        if self.contains(key) {
            return false;
        }
        self.graph.store(self.id, key, value.into());
        self.graph.install_accessor(self.id, key, true);
        true
    }

    /// Remove `key`. Returns `false` if it was absent.
    ///
    /// A tracked key is first written to `Undefined` (so its old value is
    /// unobserved and a `set` fires), then removed, then `delete` is emitted.
    pub fn delete(&self, key: &str) -> bool {
        if !self.contains(key) {
            return false;
        }
        self.set(key, Value::Undefined);
        self.graph.with_node_mut(self.id, |node| {
            if let NodeData::Object(map) = &mut node.data {
                map.shift_remove(key);
            }
        });
        if let Some(emitter) = self.graph.emitter(self.id) {
            emitter.untrack(key);
            emitter.observer().send(Change::delete(key));
        }
        true
    }
}

impl std::fmt::Debug for ObjRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjRef")
            .field("id", &self.id)
            .field("keys", &self.keys())
            .finish()
    }
}
