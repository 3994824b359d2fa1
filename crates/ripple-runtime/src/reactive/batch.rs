#![forbid(unsafe_code)]

//! Deduplicating deferred job queue.
//!
//! Jobs pushed during one turn are coalesced and run together at the next
//! tick. A job may carry an identity: while a job with that identity is
//! queued, a later non-overridable push is dropped and a later overridable
//! push cancels the queued one and takes its place.
//!
//! # Invariants
//!
//! 1. At most one flush is scheduled per turn.
//! 2. Jobs run in push order; cancelled jobs are skipped.
//! 3. Jobs pushed while a flush is running run in that same flush.
//! 4. After a flush the queue and identity index are empty and the next push
//!    schedules a new flush.
//!
//! # Failure Modes
//!
//! - Job panic: the batcher is reset (remaining jobs are dropped) and the
//!   panic propagates out of `flush`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use ripple_core::RuntimeConfig;
use ripple_core::config::DEFAULT_FLUSH_WARN_THRESHOLD;

use super::tick::TickQueue;

/// A unit of deferred work.
pub struct Job<K = u64> {
    id: Option<K>,
    overridable: bool,
    action: RefCell<Option<Box<dyn FnOnce()>>>,
    cancelled: Cell<bool>,
}

impl<K> Job<K> {
    /// A job without identity; it is never deduplicated.
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            id: None,
            overridable: false,
            action: RefCell::new(Some(Box::new(action))),
            cancelled: Cell::new(false),
        }
    }

    /// Give the job an identity for deduplication.
    #[must_use]
    pub fn with_id(mut self, id: K) -> Self {
        self.id = Some(id);
        self
    }

    /// Let this job replace a queued job with the same identity.
    #[must_use]
    pub fn overridable(mut self) -> Self {
        self.overridable = true;
        self
    }

    #[must_use]
    pub fn id(&self) -> Option<&K> {
        self.id.as_ref()
    }

    #[must_use]
    pub fn is_overridable(&self) -> bool {
        self.overridable
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Prevent the job from running. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Run the action unless cancelled or already run. Returns whether it
    /// ran.
    fn run(&self) -> bool {
        if self.cancelled.get() {
            return false;
        }
        let action = self.action.borrow_mut().take();
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for Job<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("overridable", &self.overridable)
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

struct BatcherInner<K> {
    queue: RefCell<Vec<Rc<Job<K>>>>,
    has: RefCell<AHashMap<K, Rc<Job<K>>>>,
    waiting: Cell<bool>,
    pre_flush: RefCell<Option<Rc<dyn Fn()>>>,
    tick: TickQueue,
    warn_threshold: Cell<usize>,
}

/// Coalesces jobs into one flush per tick.
///
/// Cloning a `Batcher` creates a new handle to the **same** queue.
pub struct Batcher<K = u64> {
    inner: Rc<BatcherInner<K>>,
}

impl<K> Clone for Batcher<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: Hash + Eq + Clone + 'static> Default for Batcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone + 'static> Batcher<K> {
    /// A batcher with its own tick queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tick(TickQueue::new())
    }

    /// A batcher scheduling its flushes on `tick`.
    #[must_use]
    pub fn with_tick(tick: TickQueue) -> Self {
        Self {
            inner: Rc::new(BatcherInner {
                queue: RefCell::new(Vec::new()),
                has: RefCell::new(AHashMap::new()),
                waiting: Cell::new(false),
                pre_flush: RefCell::new(None),
                tick,
                warn_threshold: Cell::new(DEFAULT_FLUSH_WARN_THRESHOLD),
            }),
        }
    }

    /// A batcher using the flush threshold from `config`.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new().with_threshold(config.flush_warn_threshold)
    }

    /// Set how many jobs one flush may run before a warning is logged.
    #[must_use]
    pub fn with_threshold(self, threshold: usize) -> Self {
        self.inner.warn_threshold.set(threshold);
        self
    }

    /// The queue flushes are scheduled on.
    #[must_use]
    pub fn tick(&self) -> &TickQueue {
        &self.inner.tick
    }

    /// Run `hook` at the start of every flush.
    pub fn set_pre_flush(&self, hook: impl Fn() + 'static) {
        *self.inner.pre_flush.borrow_mut() = Some(Rc::new(hook));
    }

    /// Queue `job`. Returns `false` when it was dropped in favour of an
    /// already queued job with the same identity.
    pub fn push(&self, job: impl Into<Rc<Job<K>>>) -> bool {
        let job = job.into();
        let queued = job
            .id()
            .and_then(|id| self.inner.has.borrow().get(id).cloned());
        if let Some(queued) = queued {
            if !job.is_overridable() {
                return false;
            }
            queued.cancel();
        }
        if let Some(id) = job.id() {
            self.inner
                .has
                .borrow_mut()
                .insert(id.clone(), Rc::clone(&job));
        }
        self.inner.queue.borrow_mut().push(job);
        if !self.inner.waiting.replace(true) {
            self.schedule();
        }
        true
    }

    fn schedule(&self) {
        let weak: Weak<BatcherInner<K>> = Rc::downgrade(&self.inner);
        self.inner.tick.next_tick(move || {
            if let Some(inner) = weak.upgrade() {
                Batcher { inner }.flush();
            }
        });
    }

    /// Run every queued job now, then reset.
    pub fn flush(&self) {
        let span = tracing::debug_span!("batch.flush", queued = self.len());
        let _entered = span.enter();
        let _reset = ResetOnExit(self);

        let hook = self.inner.pre_flush.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }

        let mut executed = 0_usize;
        let mut skipped = 0_usize;
        let mut index = 0;
        loop {
            let next = self.inner.queue.borrow().get(index).cloned();
            let Some(job) = next else {
                break;
            };
            index += 1;
            if job.run() {
                executed += 1;
                let threshold = self.inner.warn_threshold.get();
                if executed == threshold.saturating_add(1) {
                    tracing::warn!(
                        threshold,
                        "batch flush exceeded job threshold"
                    );
                }
            } else {
                skipped += 1;
            }
        }
        tracing::debug!(executed, skipped, "batch flushed");
    }

    /// Drop every queued job and clear the waiting flag.
    pub fn reset(&self) {
        self.inner.queue.borrow_mut().clear();
        self.inner.has.borrow_mut().clear();
        self.inner.waiting.set(false);
    }

    /// Number of queued jobs, cancelled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a flush is scheduled or running.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.inner.waiting.get()
    }
}

struct ResetOnExit<'a, K: Hash + Eq + Clone + 'static>(&'a Batcher<K>);

impl<K: Hash + Eq + Clone + 'static> Drop for ResetOnExit<'_, K> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

impl<K> fmt::Debug for Batcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("queued", &self.inner.queue.borrow().len())
            .field("waiting", &self.inner.waiting.get())
            .finish()
    }
}
