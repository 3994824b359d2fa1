#![forbid(unsafe_code)]

//! Reactive object graphs.
//!
//! This module turns a mutable graph of objects and arrays into a source of
//! path-qualified change events:
//!
//! - [`Graph`]: arena of object and array nodes addressed by [`NodeId`].
//! - [`ObjRef`] / [`ArrRef`]: write handles whose operations emit `set`,
//!   `delete` and `mutate` events on converted nodes.
//! - [`Observer`]: an event bus that receives changes re-emitted under dotted
//!   paths (`a.b.c`) by the proxies [`Graph::observe`] installs.
//! - [`Collection`]: RAII token under which reads emit `get`, used to collect
//!   dependencies.
//! - [`Batcher`] and [`TickQueue`]: deduplicated deferred jobs flushed once
//!   per tick.
//! - [`PathBinding`] / [`BindingScope`]: batched reactions to one key.
//!
//! # Architecture
//!
//! Every converted node owns a [`ChangeEmitter`] with its own observer.
//! Observing a child under a key installs listeners on the child's bus that
//! forward to the parent's observer with the key prefixed, so events climb
//! the graph one level per hop. Array elements additionally record the
//! arrays that own them; a change inside an element is reported by each
//! owner as a root-level `set`.
//!
//! All handles are single-threaded (`Rc`/`RefCell`). Listeners hold weak
//! references back into the graph and to parent observers.
//!
//! # Invariants
//!
//! 1. Every write to a tracked key yields exactly one `set` per observer
//!    path, no matter how many times the value was observed at that path.
//! 2. Every array operation on a converted array yields exactly one
//!    `mutate` on the array's own emitter.
//! 3. Plain reads never emit.
//! 4. A flush runs each accepted job once, in push order.
//!
//! [`NodeId`]: ripple_core::NodeId

pub mod array;
pub mod batch;
pub mod binding;
pub mod collect;
pub mod graph;
pub mod object;
pub mod observer;
pub mod ownership;
pub mod tick;
pub mod tracker;

pub use array::{ArrRef, RemoveTarget};
pub use batch::{Batcher, Job};
pub use binding::{BindingScope, PathBinding};
pub use collect::Collection;
pub use graph::{ChangeEmitter, Graph, NodeKind};
pub use object::ObjRef;
pub use observer::Observer;
pub use tick::TickQueue;
