#![forbid(unsafe_code)]

//! Runtime for ripple: observed object graphs, path proxies and batching.
//!
//! See [`reactive`] for the architecture. The most used types are
//! re-exported at the crate root.

pub mod reactive;

pub use reactive::{
    ArrRef, BindingScope, Batcher, ChangeEmitter, Collection, Graph, Job, NodeKind, ObjRef,
    Observer, PathBinding, RemoveTarget, TickQueue,
};
