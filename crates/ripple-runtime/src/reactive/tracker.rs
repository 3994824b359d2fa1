#![forbid(unsafe_code)]

//! Path proxies between observed values and their observers.
//!
//! Observing a value under `path` converts it and installs three listeners
//! on its own bus that re-emit its `get`, `set` and `mutate` events on the
//! parent observer with keys rewritten to `path.key`. Nested values are
//! observed by their parent's emitter in turn, so a write deep in the graph
//! reaches the root observer as a fully qualified dotted path.
//!
//! # Invariants
//!
//! 1. At most one proxy exists per (observer, path, value). Observing again
//!    replaces the previous proxy.
//! 2. Proxies hold their target observer weakly.
//! 3. `emit_set` visits each node at most once per call.

use std::rc::Rc;

use ahash::AHashSet;
use ripple_core::path::{join, prefix_of, segments};
use ripple_core::{Change, Listener, NodeId, Value};
use smallvec::SmallVec;

use super::graph::{Graph, NodeKind};
use super::observer::{Observer, PathProxy, WeakObserver};

fn forward(target: &WeakObserver, change: Change) {
    if let Some(observer) = target.upgrade() {
        observer.send(change);
    }
}

fn proxy_for(child: NodeId, raw_path: &str, observer: &Observer, emit_length: bool) -> PathProxy {
    let prefix = prefix_of(raw_path);

    let target = observer.downgrade();
    let get_prefix = prefix.clone();
    let get: Listener<Change> = Rc::new(move |_: &(), args: &[Change]| {
        for change in args {
            if let Change::Get { key } = change {
                forward(&target, Change::get(format!("{get_prefix}{key}")));
            }
        }
    });

    let target = observer.downgrade();
    let set_prefix = prefix.clone();
    let set_path = raw_path.to_string();
    let set: Listener<Change> = Rc::new(move |_: &(), args: &[Change]| {
        for change in args {
            let Change::Set {
                key,
                value,
                propagate,
            } = change
            else {
                continue;
            };
            if !key.is_empty() {
                forward(&target, Change::set(format!("{set_prefix}{key}"), value.clone(), false));
            }
            if !set_path.is_empty() && *propagate {
                forward(&target, Change::set(set_path.clone(), Value::Node(child), true));
            }
        }
    });

    let target = observer.downgrade();
    let mutate_path = raw_path.to_string();
    let mutate: Listener<Change> = Rc::new(move |_: &(), args: &[Change]| {
        for change in args {
            let Change::Mutate {
                key,
                container,
                mutation,
            } = change
            else {
                continue;
            };
            let fixed = if key.is_empty() {
                mutate_path.clone()
            } else {
                format!("{prefix}{key}")
            };
            forward(
                &target,
                Change::Mutate {
                    key: fixed.clone(),
                    container: container.clone(),
                    mutation: Rc::clone(mutation),
                },
            );
            if emit_length && !mutation.method.is_reorder() {
                forward(&target, Change::set(join(&fixed, "length"), mutation.length, false));
            }
        }
    });

    PathProxy { get, set, mutate }
}

impl Graph {
    /// Make `value` report its changes to `observer` under `raw_path`.
    ///
    /// Non-watchable values are ignored. A value observed for the first time
    /// is converted and watched; one that was already converted replays its
    /// current state through [`Graph::emit_set`].
    pub fn observe(&self, value: &Value, raw_path: &str, observer: &Observer) {
        let Some(id) = value.as_node() else {
            return;
        };
        if self.kind(id).is_none() {
            return;
        }
        let already = self.convert(id);
        let Some(emitter) = self.emitter(id) else {
            return;
        };
        tracing::trace!(node = %id, path = raw_path, already, "observe");
        let proxy = proxy_for(id, raw_path, observer, self.config().emit_length_events);
        observer.attach_proxy(raw_path, id, proxy, emitter.observer().bus());
        if already {
            self.emit_set(id);
        } else {
            self.watch(id);
        }
    }

    /// Remove the proxy that [`Graph::observe`] installed for the same
    /// arguments. Anything else is a no-op.
    pub fn unobserve(&self, value: &Value, raw_path: &str, observer: &Observer) {
        let Some(id) = value.as_node() else {
            return;
        };
        if observer.detach_proxy(raw_path, id) {
            tracing::trace!(node = %id, path = raw_path, "unobserve");
        }
    }

    /// Replay the current state of a converted node as `set` events: arrays
    /// announce `length`, objects announce every tracked key and recurse into
    /// nested values.
    pub fn emit_set(&self, id: NodeId) {
        let mut seen = AHashSet::new();
        self.emit_set_inner(id, &mut seen);
    }

    fn emit_set_inner(&self, id: NodeId, seen: &mut AHashSet<NodeId>) {
        if !seen.insert(id) {
            return;
        }
        let Some(emitter) = self.emitter(id) else {
            return;
        };
        let observer = emitter.observer().clone();
        match self.kind(id) {
            Some(NodeKind::Array) => {
                observer.send(Change::set("length", self.len(id), false));
            }
            Some(NodeKind::Object) => {
                for (key, value) in self.entries(id) {
                    if !emitter.is_tracked(&key) {
                        continue;
                    }
                    observer.send(Change::set(key, value.clone(), false));
                    if let Some(child) = value.as_node() {
                        self.emit_set_inner(child, seen);
                    }
                }
            }
            None => {}
        }
    }

    /// Make every segment of `path` exist below object `id`.
    ///
    /// Missing or nullish intermediates become empty objects; a scalar
    /// intermediate stops the walk. Numeric segments step into array
    /// elements that already exist. The final segment is defined as
    /// `Undefined` when absent. Keys added to converted objects are tracked.
    pub fn ensure_path(&self, id: NodeId, path: &str) {
        let segs: SmallVec<[&str; 8]> = segments(path).collect();
        let Some((last, parents)) = segs.split_last() else {
            return;
        };
        let mut current = id;
        for segment in parents {
            if let Some(arr) = self.array(current) {
                let element = segment.parse::<usize>().ok().and_then(|index| arr.get(index));
                match element.and_then(|value| value.as_node()) {
                    Some(child) => {
                        current = child;
                        continue;
                    }
                    None => return,
                }
            }
            let Some(obj) = self.object(current) else {
                return;
            };
            match obj.get(segment) {
                Value::Node(child) => current = child,
                value if !value.is_nullish() => return,
                _ => {
                    let child = self.new_object(Vec::<(String, Value)>::new());
                    if obj.is_tracked(segment) {
                        obj.set(segment, child.clone());
                    } else {
                        self.store(current, segment, child.clone());
                        self.install_accessor(current, segment, false);
                    }
                    let Some(child) = child.as_node() else {
                        return;
                    };
                    current = child;
                }
            }
        }
        if let Some(obj) = self.object(current)
            && !obj.contains(last)
        {
            self.store(current, last, Value::Undefined);
            self.install_accessor(current, last, false);
        }
    }

    /// Give object `new` every key of object `old` that it lacks: arrays
    /// become empty arrays, objects become recursively stubbed objects, and
    /// anything else becomes `Undefined`.
    ///
    /// Keeps a replacement value observable at all the paths its predecessor
    /// was.
    pub fn copy_paths(&self, new: &Value, old: &Value) {
        let mut seen = AHashSet::new();
        self.copy_paths_inner(new, old, &mut seen);
    }

    fn copy_paths_inner(&self, new: &Value, old: &Value, seen: &mut AHashSet<NodeId>) {
        let (Some(new_id), Some(old_id)) = (new.as_node(), old.as_node()) else {
            return;
        };
        if self.kind(new_id) != Some(NodeKind::Object)
            || self.kind(old_id) != Some(NodeKind::Object)
            || !seen.insert(old_id)
        {
            return;
        }
        for (key, old_value) in self.entries(old_id) {
            if self.contains_key(new_id, &key) {
                continue;
            }
            let stub = match old_value.as_node().and_then(|child| self.kind(child)) {
                Some(NodeKind::Array) => self.new_array(Vec::<Value>::new()),
                Some(NodeKind::Object) => {
                    let stub = self.new_object(Vec::<(String, Value)>::new());
                    self.copy_paths_inner(&stub, &old_value, seen);
                    stub
                }
                None => Value::Undefined,
            };
            self.store(new_id, &key, stub);
            self.install_accessor(new_id, &key, false);
        }
    }

    /// Swap the root value an observer is attached to, carrying the old
    /// root's key layout over to the new one.
    pub fn replace_root(&self, observer: &Observer, old: &Value, new: &Value) {
        self.unobserve(old, "", observer);
        self.copy_paths(new, old);
        self.observe(new, "", observer);
    }
}
