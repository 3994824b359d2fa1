#![forbid(unsafe_code)]

//! Dependency collection.
//!
//! Plain reads never emit. While a [`Collection`] is open, reads made
//! through it emit `get` for every tracked key they traverse, which the path
//! proxies turn into dotted keys on the root observer. Recording an observer
//! gathers those keys into a deduplicated dependency list.
//!
//! ```ignore
//! let mut collection = graph.begin_collection();
//! collection.record(&root_observer);
//! let total = collection.get_path(root, "cart.total");
//! let deps = collection.finish(); // ["cart", "cart.total"]
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;
use ripple_core::change::GET;
use ripple_core::path::segments;
use ripple_core::{Change, NodeId, Subscription, Value};

use super::graph::{Graph, NodeKind};
use super::observer::Observer;

/// RAII token marking a dependency-collection window.
///
/// Collections nest; [`Graph::is_collecting`] stays true until the last one
/// is dropped.
#[must_use = "reads only emit while the collection is alive"]
pub struct Collection<'g> {
    graph: &'g Graph,
    seen: Rc<RefCell<IndexSet<String>>>,
    subscriptions: Vec<Subscription>,
}

impl Graph {
    /// Open a collection window.
    pub fn begin_collection(&self) -> Collection<'_> {
        let depth = &self.inner.collecting;
        depth.set(depth.get() + 1);
        Collection {
            graph: self,
            seen: Rc::new(RefCell::new(IndexSet::new())),
            subscriptions: Vec::new(),
        }
    }
}

impl Collection<'_> {
    /// Read `key` of object `id`, emitting `get` when the key is tracked.
    pub fn get(&self, id: NodeId, key: &str) -> Value {
        let value = self.graph.get(id, key).unwrap_or_default();
        if let Some(emitter) = self.graph.emitter(id)
            && emitter.is_tracked(key)
        {
            emitter.observer().send(Change::get(key));
        }
        value
    }

    /// Walk a dotted path from `id`, emitting `get` for each tracked object
    /// key on the way. Array segments accept `length` or an index and do not
    /// emit. Missing segments read as `Undefined`.
    pub fn get_path(&self, id: NodeId, path: &str) -> Value {
        let mut current = Value::Node(id);
        for segment in segments(path) {
            let Some(node) = current.as_node() else {
                return Value::Undefined;
            };
            current = match self.graph.kind(node) {
                Some(NodeKind::Object) => self.get(node, segment),
                Some(NodeKind::Array) if segment == "length" => Value::from(self.graph.len(node)),
                Some(NodeKind::Array) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.graph.items(node).get(index).cloned())
                    .unwrap_or_default(),
                None => Value::Undefined,
            };
        }
        current
    }

    /// Remember every key `observer` reports a `get` for while this
    /// collection is open.
    pub fn record(&mut self, observer: &Observer) -> &mut Self {
        let seen = Rc::clone(&self.seen);
        self.subscriptions.push(observer.subscribe(GET, move |change| {
            seen.borrow_mut().insert(change.key().to_string());
        }));
        self
    }

    /// Keys recorded so far, in first-seen order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.seen.borrow().iter().cloned().collect()
    }

    /// Close the window and return the recorded keys.
    #[must_use]
    pub fn finish(self) -> Vec<String> {
        self.keys()
    }
}

impl Drop for Collection<'_> {
    fn drop(&mut self) {
        let depth = &self.graph.inner.collecting;
        depth.set(depth.get().saturating_sub(1));
    }
}

impl std::fmt::Debug for Collection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("recorded", &self.seen.borrow().len())
            .field("observers", &self.subscriptions.len())
            .finish()
    }
}
