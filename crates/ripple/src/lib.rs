#![forbid(unsafe_code)]

//! ripple public facade.
//!
//! Re-exports the event bus and value model from `ripple-core` and the
//! observed object graph from `ripple-runtime`. Most programs only need the
//! [`prelude`].
//!
//! ```ignore
//! use ripple::prelude::*;
//!
//! let graph = Graph::new();
//! let todo = graph.new_object([("done", false)]);
//! let root = graph.new_object([("todo", todo.clone())]);
//!
//! let observer = Observer::new();
//! graph.observe(&root, "", &observer);
//! let _sub = observer.subscribe("set", |change| println!("{} changed", change.key()));
//!
//! graph.object(todo.as_node().unwrap()).unwrap().set("done", true);
//! // prints "todo.done changed", then "todo changed"
//! ```

pub use ripple_core as core;
pub use ripple_runtime as runtime;

pub use ripple_core::{
    ArrayMethod, Change, ChangeBus, EventBus, HostRef, Listener, Mutation, MutationResult,
    NodeId, Result, RippleError, RuntimeConfig, Subscription, Value,
};
pub use ripple_runtime::reactive;
pub use ripple_runtime::{
    ArrRef, Batcher, BindingScope, Collection, Graph, Job, NodeKind, ObjRef, Observer,
    PathBinding, RemoveTarget, TickQueue,
};

/// Everything needed to observe a graph and react to its changes.
pub mod prelude {
    pub use ripple_core::change::{DELETE, GET, MUTATE, SET};
    pub use ripple_core::{Change, Mutation, RuntimeConfig, Subscription, Value};
    pub use ripple_runtime::{
        Batcher, BindingScope, Graph, Job, Observer, PathBinding, RemoveTarget, TickQueue,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn prelude_covers_the_common_path() {
        let graph = Graph::new();
        let todo = graph.new_object([("done", false)]);
        let root = graph.new_object([("todo", todo.clone())]);
        let observer = Observer::new();
        graph.observe(&root, "", &observer);

        let keys = Rc::new(RefCell::new(Vec::new()));
        let k = Rc::clone(&keys);
        let _sub = observer.subscribe(SET, move |change| k.borrow_mut().push(change.key().to_string()));

        graph.object(todo.as_node().unwrap()).unwrap().set("done", true);
        assert_eq!(*keys.borrow(), vec!["todo.done", "todo"]);
    }
}
