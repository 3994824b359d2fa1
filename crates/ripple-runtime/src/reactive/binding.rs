#![forbid(unsafe_code)]

//! Path bindings: batched reactions to changes at one dotted key.
//!
//! A [`PathBinding`] listens on an observer for `set` and `mutate` events at
//! a single key and, instead of reacting immediately, pushes a job onto a
//! [`Batcher`]. Several writes to the key during one turn collapse into one
//! update that sees the latest change.
//!
//! # Usage
//!
//! ```ignore
//! let batcher: Batcher = Batcher::new();
//! let mut scope = BindingScope::new();
//! scope.bind(&root_observer, "cart.total", &batcher, |change| {
//!     println!("total is now {change:?}");
//! });
//!
//! cart.set("total", 11);
//! cart.set("total", 12);
//! batcher.tick().run(); // prints once, with 12
//! ```
//!
//! # Invariants
//!
//! 1. At most one update per binding is queued at a time.
//! 2. An update always receives the most recent matching change.
//! 3. Dropping a binding (or its scope) removes its listeners; an update
//!    already queued becomes a no-op.
//! 4. Subscriptions in a scope are released in reverse registration order.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ripple_core::change::{MUTATE, SET};
use ripple_core::{Change, Subscription};

use super::batch::{Batcher, Job};
use super::observer::Observer;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

type Update = Rc<dyn Fn(&Change)>;

/// Reacts to changes at one dotted key through a batcher.
pub struct PathBinding {
    id: u64,
    key: String,
    latest: Rc<RefCell<Option<Change>>>,
    subscriptions: Vec<Subscription>,
}

impl PathBinding {
    /// Bind `update` to changes at `key` on `observer`, batched through
    /// `batcher`.
    pub fn new(
        observer: &Observer,
        key: impl Into<String>,
        batcher: &Batcher<u64>,
        update: impl Fn(&Change) + 'static,
    ) -> Self {
        let id = NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed);
        let key = key.into();
        let latest: Rc<RefCell<Option<Change>>> = Rc::new(RefCell::new(None));
        let update: Update = Rc::new(update);

        let subscriptions = [SET, MUTATE]
            .into_iter()
            .map(|event| {
                let key = key.clone();
                let latest = Rc::clone(&latest);
                let update = Rc::clone(&update);
                let batcher = batcher.clone();
                observer.subscribe(event, move |change| {
                    if change.key() != key {
                        return;
                    }
                    *latest.borrow_mut() = Some(change.clone());
                    let pending = Rc::downgrade(&latest);
                    let update = Rc::clone(&update);
                    batcher.push(
                        Job::new(move || {
                            let change = pending
                                .upgrade()
                                .and_then(|latest| latest.borrow_mut().take());
                            if let Some(change) = change {
                                update(&change);
                            }
                        })
                        .with_id(id),
                    );
                })
            })
            .collect();

        Self {
            id,
            key,
            latest,
            subscriptions,
        }
    }

    /// Identity used for deduplication in the batcher.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a change is waiting for the next flush.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.latest.borrow().is_some()
    }

    /// Number of live listeners held by this binding.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl std::fmt::Debug for PathBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathBinding")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// A guard held by a [`BindingScope`], in registration order.
enum Held {
    Binding(PathBinding),
    Subscription(Subscription),
}

/// Collects bindings and subscriptions for a logical scope.
///
/// When the scope is dropped, everything it holds is released.
#[derive(Default)]
pub struct BindingScope {
    held: Vec<Held>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.held.push(Held::Subscription(sub));
    }

    /// Subscribe to `event` on `observer` within this scope.
    pub fn subscribe(
        &mut self,
        observer: &Observer,
        event: &str,
        callback: impl Fn(&Change) + 'static,
    ) -> &mut Self {
        self.hold(observer.subscribe(event, callback));
        self
    }

    /// Create a [`PathBinding`] owned by this scope.
    pub fn bind(
        &mut self,
        observer: &Observer,
        key: impl Into<String>,
        batcher: &Batcher<u64>,
        update: impl Fn(&Change) + 'static,
    ) -> &mut Self {
        self.held
            .push(Held::Binding(PathBinding::new(observer, key, batcher, update)));
        self
    }

    /// Number of bindings and plain subscriptions held.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binding_count() == 0
    }

    /// Release everything now. The scope stays usable.
    pub fn clear(&mut self) {
        while let Some(held) = self.held.pop() {
            match held {
                Held::Binding(binding) => drop(binding),
                Held::Subscription(sub) => drop(sub),
            }
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.binding_count())
            .finish()
    }
}
