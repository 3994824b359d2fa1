#![forbid(unsafe_code)]

//! Arena of observable objects and arrays.
//!
//! # Design
//!
//! Composite values live in a single arena owned by [`Graph`] and are
//! addressed by [`NodeId`]. Nodes are never freed, so an id handed out by a
//! graph stays valid for the graph's lifetime. Relationships between nodes
//! (object members, array elements, array owners) are stored as ids, never
//! as shared pointers.
//!
//! A node becomes observable once it is *converted*: conversion attaches a
//! [`ChangeEmitter`] holding the node's own [`Observer`], the set of keys
//! that have accessors installed, and the arrays that currently own the node.
//!
//! # Invariants
//!
//! 1. A node is converted at most once; [`Graph::convert`] reports whether it
//!    already was.
//! 2. No `RefCell` borrow of the arena is held while an event is dispatched,
//!    so listeners may freely read and write the graph.
//! 3. A node's owners list never contains duplicates.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use indexmap::IndexMap;
use ripple_core::change::{MUTATE, SET};
use ripple_core::path::is_reserved;
use ripple_core::{Change, NodeId, RuntimeConfig, Value};

use super::observer::Observer;

/// Shape of a composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
}

#[derive(Debug)]
pub(crate) enum NodeData {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

impl NodeData {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Object(_) => NodeKind::Object,
            Self::Array(_) => NodeKind::Array,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) data: NodeData,
    pub(crate) emitter: Option<Rc<ChangeEmitter>>,
}

/// Observation state attached to a converted node.
pub struct ChangeEmitter {
    observer: Observer,
    owners: RefCell<Vec<NodeId>>,
    tracked: RefCell<AHashSet<String>>,
}

impl ChangeEmitter {
    fn new() -> Self {
        Self {
            observer: Observer::new(),
            owners: RefCell::new(Vec::new()),
            tracked: RefCell::new(AHashSet::new()),
        }
    }

    /// The node's own observer. Parents install path proxies on its bus.
    #[must_use]
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Arrays currently holding this node as an element.
    #[must_use]
    pub fn owners(&self) -> Vec<NodeId> {
        self.owners.borrow().clone()
    }

    /// Whether `key` has an accessor installed.
    #[must_use]
    pub fn is_tracked(&self, key: &str) -> bool {
        self.tracked.borrow().contains(key)
    }

    pub(crate) fn track(&self, key: &str) {
        self.tracked.borrow_mut().insert(key.to_string());
    }

    pub(crate) fn untrack(&self, key: &str) {
        self.tracked.borrow_mut().remove(key);
    }

    pub(crate) fn add_owner(&self, owner: NodeId) {
        let mut owners = self.owners.borrow_mut();
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    }

    pub(crate) fn remove_owner(&self, owner: NodeId) {
        let mut owners = self.owners.borrow_mut();
        if let Some(pos) = owners.iter().position(|id| *id == owner) {
            owners.remove(pos);
        }
    }
}

impl fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("owners", &self.owners.borrow())
            .field("tracked", &self.tracked.borrow().len())
            .finish()
    }
}

pub(crate) struct GraphInner {
    pub(crate) nodes: RefCell<Vec<Node>>,
    pub(crate) config: RuntimeConfig,
    pub(crate) collecting: Cell<u32>,
    pub(crate) propagating: RefCell<AHashSet<NodeId>>,
}

/// Shared handle to an object graph.
///
/// Cloning a `Graph` creates a new handle to the **same** arena.
#[derive(Clone)]
pub struct Graph {
    pub(crate) inner: Rc<GraphInner>,
}

/// Non-owning handle used by listeners installed inside the graph.
#[derive(Clone)]
pub(crate) struct WeakGraph(Weak<GraphInner>);

impl WeakGraph {
    pub(crate) fn upgrade(&self) -> Option<Graph> {
        self.0.upgrade().map(|inner| Graph { inner })
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty graph with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an empty graph with `config`.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(GraphInner {
                nodes: RefCell::new(Vec::new()),
                config,
                collecting: Cell::new(0),
                propagating: RefCell::new(AHashSet::new()),
            }),
        }
    }

    /// Like [`Graph::with_config`], rejecting configurations that fail
    /// [`RuntimeConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`RippleError::InvalidConfig`] for an invalid configuration.
    ///
    /// [`RippleError::InvalidConfig`]: ripple_core::RippleError::InvalidConfig
    pub fn try_with_config(config: RuntimeConfig) -> ripple_core::Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakGraph {
        WeakGraph(Rc::downgrade(&self.inner))
    }

    /// Whether both handles refer to the same arena.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn alloc(&self, data: NodeData) -> NodeId {
        let mut nodes = self.inner.nodes.borrow_mut();
        let id = NodeId::from_index(nodes.len());
        nodes.push(Node {
            data,
            emitter: None,
        });
        id
    }

    /// Allocate a plain (not yet observed) object.
    pub fn new_object<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Node(self.alloc(NodeData::Object(map)))
    }

    /// Allocate a plain (not yet observed) array.
    pub fn new_array<V: Into<Value>>(&self, items: impl IntoIterator<Item = V>) -> Value {
        let items = items.into_iter().map(Into::into).collect();
        Value::Node(self.alloc(NodeData::Array(items)))
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.inner.nodes.borrow().get(id.index()).map(f)
    }

    pub(crate) fn with_node_mut<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut Node) -> R,
    ) -> Option<R> {
        self.inner.nodes.borrow_mut().get_mut(id.index()).map(f)
    }

    /// Number of nodes ever allocated.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    /// Object or array, `None` for ids this graph never issued.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.with_node(id, |node| node.data.kind())
    }

    #[must_use]
    pub fn is_object(&self, value: &Value) -> bool {
        value
            .as_node()
            .is_some_and(|id| self.kind(id) == Some(NodeKind::Object))
    }

    #[must_use]
    pub fn is_array(&self, value: &Value) -> bool {
        value
            .as_node()
            .is_some_and(|id| self.kind(id) == Some(NodeKind::Array))
    }

    #[must_use]
    pub fn is_converted(&self, id: NodeId) -> bool {
        self.with_node(id, |node| node.emitter.is_some())
            .unwrap_or(false)
    }

    /// The emitter of a converted node.
    #[must_use]
    pub fn emitter(&self, id: NodeId) -> Option<Rc<ChangeEmitter>> {
        self.with_node(id, |node| node.emitter.clone()).flatten()
    }

    /// The observer of a converted node.
    #[must_use]
    pub fn observer_of(&self, id: NodeId) -> Option<Observer> {
        self.emitter(id).map(|emitter| emitter.observer.clone())
    }

    /// Arrays currently holding `id` as an element.
    #[must_use]
    pub fn owners(&self, id: NodeId) -> Vec<NodeId> {
        self.emitter(id)
            .map(|emitter| emitter.owners())
            .unwrap_or_default()
    }

    /// Raw read of an object key. Never emits.
    #[must_use]
    pub fn get(&self, id: NodeId, key: &str) -> Option<Value> {
        self.with_node(id, |node| match &node.data {
            NodeData::Object(map) => map.get(key).cloned(),
            NodeData::Array(_) => None,
        })
        .flatten()
    }

    /// Object keys in insertion order; empty for arrays.
    #[must_use]
    pub fn keys(&self, id: NodeId) -> Vec<String> {
        self.with_node(id, |node| match &node.data {
            NodeData::Object(map) => map.keys().cloned().collect(),
            NodeData::Array(_) => Vec::new(),
        })
        .unwrap_or_default()
    }

    pub(crate) fn entries(&self, id: NodeId) -> Vec<(String, Value)> {
        self.with_node(id, |node| match &node.data {
            NodeData::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            NodeData::Array(_) => Vec::new(),
        })
        .unwrap_or_default()
    }

    /// Array elements; empty for objects.
    #[must_use]
    pub fn items(&self, id: NodeId) -> Vec<Value> {
        self.with_node(id, |node| match &node.data {
            NodeData::Array(items) => items.clone(),
            NodeData::Object(_) => Vec::new(),
        })
        .unwrap_or_default()
    }

    /// Key count for objects, element count for arrays.
    #[must_use]
    pub fn len(&self, id: NodeId) -> usize {
        self.with_node(id, |node| match &node.data {
            NodeData::Object(map) => map.len(),
            NodeData::Array(items) => items.len(),
        })
        .unwrap_or(0)
    }

    #[must_use]
    pub fn contains_key(&self, id: NodeId, key: &str) -> bool {
        self.with_node(id, |node| match &node.data {
            NodeData::Object(map) => map.contains_key(key),
            NodeData::Array(_) => false,
        })
        .unwrap_or(false)
    }

    /// Whether `key` of `id` has an accessor installed.
    #[must_use]
    pub fn is_tracked(&self, id: NodeId, key: &str) -> bool {
        self.emitter(id)
            .is_some_and(|emitter| emitter.is_tracked(key))
    }

    pub(crate) fn is_reserved_key(&self, key: &str) -> bool {
        is_reserved(key, &self.inner.config.reserved_prefixes)
    }

    /// True while at least one dependency collection is open.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.inner.collecting.get() > 0
    }

    /// Attach a change emitter to `id`.
    ///
    /// Returns `true` when the node was already converted (or is unknown),
    /// in which case nothing happens.
    pub fn convert(&self, id: NodeId) -> bool {
        let installed = self
            .with_node_mut(id, |node| {
                if node.emitter.is_some() {
                    return None;
                }
                let emitter = Rc::new(ChangeEmitter::new());
                node.emitter = Some(Rc::clone(&emitter));
                Some(emitter)
            })
            .flatten();

        let Some(emitter) = installed else {
            return true;
        };
        tracing::trace!(node = %id, "convert");

        // Element changes surface on every array that owns the element.
        let weak = self.downgrade();
        emitter.observer.on(SET, move |change| {
            if let Change::Set {
                propagate: true, ..
            } = change
                && let Some(graph) = weak.upgrade()
            {
                graph.propagate_change(id);
            }
        });
        let weak = self.downgrade();
        emitter.observer.on(MUTATE, move |_| {
            if let Some(graph) = weak.upgrade() {
                graph.propagate_change(id);
            }
        });
        false
    }

    /// Install accessors on every key of an object, or link every element of
    /// an array, recursively observing nested values.
    pub fn watch(&self, id: NodeId) {
        match self.kind(id) {
            Some(NodeKind::Object) => {
                for key in self.keys(id) {
                    self.install_accessor(id, &key, false);
                }
            }
            Some(NodeKind::Array) => {
                let items = self.items(id);
                self.link(id, &items);
            }
            None => {}
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .field("collecting", &self.is_collecting())
            .finish()
    }
}
