#![forbid(unsafe_code)]

//! Structural operations on arrays.
//!
//! Every operation on a converted array performs the native behaviour,
//! links inserted elements, unlinks removed ones and emits exactly one
//! `mutate` event with key `""` on the array's own emitter. Operations on an
//! array that was never converted only change the buffer.

use std::cmp::Ordering;
use std::rc::Rc;

use ripple_core::{ArrayMethod, Change, Mutation, MutationResult, NodeId, Value};

use super::graph::{Graph, NodeData, NodeKind};

/// What [`ArrRef::remove`] should remove.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveTarget {
    /// The element at this position.
    Index(usize),
    /// The first element strictly equal to this value.
    Value(Value),
}

impl From<usize> for RemoveTarget {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Value> for RemoveTarget {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Borrowed view of an array node.
#[derive(Clone, Copy)]
pub struct ArrRef<'g> {
    graph: &'g Graph,
    id: NodeId,
}

/// Outcome of a buffer operation before events are sent.
struct Applied {
    result: MutationResult,
    inserted: Option<Vec<Value>>,
    removed: Option<Vec<Value>>,
}

impl Graph {
    /// View `id` as an array, if it is one.
    #[must_use]
    pub fn array(&self, id: NodeId) -> Option<ArrRef<'_>> {
        (self.kind(id) == Some(NodeKind::Array)).then_some(ArrRef { graph: self, id })
    }
}

/// An array buffer moved out of the arena while an operation runs, so
/// comparators and other callbacks may read the graph. Dropping it puts the
/// buffer back, also when the operation panics.
struct Detached<'g> {
    graph: &'g Graph,
    id: NodeId,
    items: Vec<Value>,
}

impl<'g> Detached<'g> {
    fn take(graph: &'g Graph, id: NodeId) -> Option<Self> {
        let items = graph
            .with_node_mut(id, |node| match &mut node.data {
                NodeData::Array(items) => Some(std::mem::take(items)),
                NodeData::Object(_) => None,
            })
            .flatten()?;
        Some(Self { graph, id, items })
    }
}

impl Drop for Detached<'_> {
    fn drop(&mut self) {
        let items = std::mem::take(&mut self.items);
        self.graph.with_node_mut(self.id, |node| {
            if let NodeData::Array(slot) = &mut node.data {
                *slot = items;
            }
        });
    }
}

/// Resolve a splice start the way `Array.prototype.splice` does.
fn clamp_start(start: isize, len: usize) -> usize {
    if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        start.unsigned_abs().min(len)
    }
}

impl<'g> ArrRef<'g> {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len(self.id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.graph
            .with_node(self.id, |node| match &node.data {
                NodeData::Array(items) => items.get(index).cloned(),
                NodeData::Object(_) => None,
            })
            .flatten()
    }

    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.graph.items(self.id)
    }

    /// Position of the first element strictly equal to `value`.
    #[must_use]
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.graph
            .with_node(self.id, |node| match &node.data {
                NodeData::Array(items) => items.iter().position(|item| item == value),
                NodeData::Object(_) => None,
            })
            .flatten()
    }

    fn apply(
        &self,
        method: ArrayMethod,
        args: Vec<Value>,
        op: impl FnOnce(&mut Vec<Value>) -> Applied,
    ) -> MutationResult {
        let Some(mut detached) = Detached::take(self.graph, self.id) else {
            return MutationResult::Reordered;
        };
        let applied = op(&mut detached.items);
        let length = detached.items.len();
        drop(detached);

        let Some(emitter) = self.graph.emitter(self.id) else {
            return applied.result;
        };
        if let Some(inserted) = &applied.inserted {
            self.graph.link(self.id, inserted);
        }
        if let Some(removed) = &applied.removed {
            self.graph.unlink(self.id, removed);
        }
        tracing::trace!(node = %self.id, %method, length, "array mutation");
        let result = applied.result.clone();
        emitter.observer().send(Change::Mutate {
            key: String::new(),
            container: Value::Node(self.id),
            mutation: Rc::new(Mutation {
                method,
                args,
                result: applied.result,
                inserted: applied.inserted,
                removed: applied.removed,
                length,
            }),
        });
        result
    }

    /// Append `items`; returns the new length.
    pub fn push(&self, items: impl IntoIterator<Item = Value>) -> usize {
        let items: Vec<Value> = items.into_iter().collect();
        let args = items.clone();
        let result = self.apply(ArrayMethod::Push, args, |buf| {
            buf.extend(items.iter().cloned());
            Applied {
                result: MutationResult::Length(buf.len()),
                inserted: Some(items),
                removed: None,
            }
        });
        match result {
            MutationResult::Length(len) => len,
            _ => self.len(),
        }
    }

    /// Remove the last element.
    pub fn pop(&self) -> Option<Value> {
        let result = self.apply(ArrayMethod::Pop, Vec::new(), |buf| {
            let item = buf.pop();
            Applied {
                removed: Some(item.iter().cloned().collect()),
                result: MutationResult::Item(item),
                inserted: None,
            }
        });
        match result {
            MutationResult::Item(item) => item,
            _ => None,
        }
    }

    /// Prepend `items`, keeping their order; returns the new length.
    pub fn unshift(&self, items: impl IntoIterator<Item = Value>) -> usize {
        let items: Vec<Value> = items.into_iter().collect();
        let args = items.clone();
        let result = self.apply(ArrayMethod::Unshift, args, |buf| {
            buf.splice(0..0, items.iter().cloned());
            Applied {
                result: MutationResult::Length(buf.len()),
                inserted: Some(items),
                removed: None,
            }
        });
        match result {
            MutationResult::Length(len) => len,
            _ => self.len(),
        }
    }

    /// Remove the first element.
    pub fn shift(&self) -> Option<Value> {
        let result = self.apply(ArrayMethod::Shift, Vec::new(), |buf| {
            let item = (!buf.is_empty()).then(|| buf.remove(0));
            Applied {
                removed: Some(item.iter().cloned().collect()),
                result: MutationResult::Item(item),
                inserted: None,
            }
        });
        match result {
            MutationResult::Item(item) => item,
            _ => None,
        }
    }

    /// Remove `delete_count` elements at `start` (all remaining when `None`)
    /// and insert `items` there. A negative `start` counts from the end.
    /// Returns the removed elements.
    pub fn splice(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let items: Vec<Value> = items.into_iter().collect();
        let mut args = Vec::with_capacity(items.len() + 2);
        args.push(Value::Number(start as f64));
        if let Some(count) = delete_count {
            args.push(Value::from(count));
        }
        args.extend(items.iter().cloned());

        let result = self.apply(ArrayMethod::Splice, args, |buf| {
            let len = buf.len();
            let from = clamp_start(start, len);
            let count = delete_count.map_or(len - from, |count| count.min(len - from));
            let removed: Vec<Value> = buf.splice(from..from + count, items.iter().cloned()).collect();
            Applied {
                result: MutationResult::Items(removed.clone()),
                inserted: Some(items),
                removed: Some(removed),
            }
        });
        match result {
            MutationResult::Items(removed) => removed,
            _ => Vec::new(),
        }
    }

    /// Stable sort by [`Value::default_cmp`].
    pub fn sort(&self) {
        self.sort_by(Value::default_cmp);
    }

    /// Stable sort by `compare`. The comparator may read the graph, but
    /// sees this array as empty while the sort runs.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.apply(ArrayMethod::Sort, Vec::new(), |buf| {
            buf.sort_by(&mut compare);
            Applied {
                result: MutationResult::Reordered,
                inserted: None,
                removed: None,
            }
        });
    }

    pub fn reverse(&self) {
        self.apply(ArrayMethod::Reverse, Vec::new(), |buf| {
            buf.reverse();
            Applied {
                result: MutationResult::Reordered,
                inserted: None,
                removed: None,
            }
        });
    }

    /// Replace the element at `index` (appending when `index` is past the
    /// end). Returns the replaced element.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let start = isize::try_from(index).unwrap_or(isize::MAX);
        self.splice(start, Some(1), [value.into()]).into_iter().next()
    }

    /// Remove one element by position or by value.
    ///
    /// Returns `None`, without emitting, when nothing matches.
    pub fn remove(&self, target: impl Into<RemoveTarget>) -> Option<Value> {
        let index = match target.into() {
            RemoveTarget::Index(index) => (index < self.len()).then_some(index),
            RemoveTarget::Value(value) => self.index_of(&value),
        }?;
        let start = isize::try_from(index).ok()?;
        self.splice(start, Some(1), []).into_iter().next()
    }
}

impl std::fmt::Debug for ArrRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrRef")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observer;
    use ripple_core::change::MUTATE;
    use std::cell::RefCell;

    fn nums(values: &[i32]) -> Vec<Value> {
        values.iter().copied().map(Value::from).collect()
    }

    fn mutations(observer: &Observer) -> Rc<RefCell<Vec<Rc<Mutation>>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        observer.on(MUTATE, move |change| {
            if let Change::Mutate { mutation, .. } = change {
                l.borrow_mut().push(Rc::clone(mutation));
            }
        });
        log
    }

    fn observed_array(graph: &Graph, values: &[i32]) -> (NodeId, Rc<RefCell<Vec<Rc<Mutation>>>>) {
        let arr = graph.new_array(nums(values));
        let id = arr.as_node().unwrap();
        let observer = Observer::new();
        graph.observe(&arr, "", &observer);
        let log = mutations(&graph.observer_of(id).unwrap());
        (id, log)
    }

    #[test]
    fn clamp_start_follows_splice_rules() {
        assert_eq!(clamp_start(0, 3), 0);
        assert_eq!(clamp_start(5, 3), 3);
        assert_eq!(clamp_start(-1, 3), 2);
        assert_eq!(clamp_start(-10, 3), 0);
    }

    #[test]
    fn push_and_pop() {
        let graph = Graph::new();
        let (id, log) = observed_array(&graph, &[1]);
        let arr = graph.array(id).unwrap();

        assert_eq!(arr.push(nums(&[2, 3])), 3);
        assert_eq!(arr.pop(), Some(Value::from(3)));
        assert_eq!(arr.items(), nums(&[1, 2]));

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].method, ArrayMethod::Push);
        assert_eq!(log[0].inserted, Some(nums(&[2, 3])));
        assert_eq!(log[0].removed, None);
        assert_eq!(log[0].length, 3);
        assert_eq!(log[1].removed, Some(nums(&[3])));
        assert_eq!(log[1].result, MutationResult::Item(Some(Value::from(3))));
    }

    #[test]
    fn pop_and_shift_on_empty_still_report() {
        let graph = Graph::new();
        let (id, log) = observed_array(&graph, &[]);
        let arr = graph.array(id).unwrap();
        assert_eq!(arr.pop(), None);
        assert_eq!(arr.shift(), None);
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].method, ArrayMethod::Shift);
        assert_eq!(log[1].removed, Some(Vec::new()));
    }

    #[test]
    fn unshift_keeps_argument_order() {
        let graph = Graph::new();
        let (id, _) = observed_array(&graph, &[3]);
        let arr = graph.array(id).unwrap();
        assert_eq!(arr.unshift(nums(&[1, 2])), 3);
        assert_eq!(arr.items(), nums(&[1, 2, 3]));
        assert_eq!(arr.shift(), Some(Value::from(1)));
    }

    #[test]
    fn splice_reports_args_and_removed() {
        let graph = Graph::new();
        let (id, log) = observed_array(&graph, &[1, 2, 3, 4]);
        let arr = graph.array(id).unwrap();
        let removed = arr.splice(-3, Some(2), nums(&[9]));
        assert_eq!(removed, nums(&[2, 3]));
        assert_eq!(arr.items(), nums(&[1, 9, 4]));

        let log = log.borrow();
        assert_eq!(log[0].args, vec![Value::from(-3), Value::from(2), Value::from(9)]);
        assert_eq!(log[0].inserted, Some(nums(&[9])));
        assert_eq!(log[0].removed, Some(nums(&[2, 3])));
        assert_eq!(log[0].length, 3);
    }

    #[test]
    fn splice_without_count_removes_the_tail() {
        let graph = Graph::new();
        let (id, _) = observed_array(&graph, &[1, 2, 3]);
        let arr = graph.array(id).unwrap();
        assert_eq!(arr.splice(1, None, []), nums(&[2, 3]));
        assert_eq!(arr.items(), nums(&[1]));
    }

    #[test]
    fn sort_and_reverse_report_no_elements() {
        let graph = Graph::new();
        let (id, log) = observed_array(&graph, &[3, 1, 2]);
        let arr = graph.array(id).unwrap();
        arr.sort();
        assert_eq!(arr.items(), nums(&[1, 2, 3]));
        arr.reverse();
        assert_eq!(arr.items(), nums(&[3, 2, 1]));
        arr.sort_by(|a, b| a.default_cmp(b));
        let log = log.borrow();
        assert_eq!(log.len(), 3);
        for m in log.iter() {
            assert!(m.inserted.is_none());
            assert!(m.removed.is_none());
            assert_eq!(m.result, MutationResult::Reordered);
        }
    }

    #[test]
    fn sort_by_may_read_elements_through_the_graph() {
        let graph = Graph::new();
        let items = vec![
            graph.new_object([("n", 2)]),
            graph.new_object([("n", 1)]),
            graph.new_object([("n", 3)]),
        ];
        let list = graph.new_array(items.clone());
        let id = list.as_node().unwrap();
        graph.observe(&list, "", &Observer::new());
        let log = mutations(&graph.observer_of(id).unwrap());

        let arr = graph.array(id).unwrap();
        arr.sort_by(|a, b| {
            let field = |v: &Value| v.as_node().and_then(|n| graph.get(n, "n"));
            field(a).unwrap().default_cmp(&field(b).unwrap())
        });

        assert_eq!(
            arr.items(),
            vec![items[1].clone(), items[0].clone(), items[2].clone()]
        );
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].length, 3);
    }

    #[test]
    fn panicking_comparator_leaves_the_buffer_in_place() {
        let graph = Graph::new();
        let (id, _) = observed_array(&graph, &[2, 1]);
        let arr = graph.array(id).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            arr.sort_by(|_, _| panic!("comparator failure"));
        }));
        assert!(result.is_err());
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn set_index_replaces_or_appends() {
        let graph = Graph::new();
        let (id, log) = observed_array(&graph, &[1, 2]);
        let arr = graph.array(id).unwrap();
        assert_eq!(arr.set_index(0, 7), Some(Value::from(1)));
        assert_eq!(arr.set_index(5, 8), None);
        assert_eq!(arr.items(), nums(&[7, 2, 8]));
        assert!(log.borrow().iter().all(|m| m.method == ArrayMethod::Splice));
    }

    #[test]
    fn remove_by_index_and_value() {
        let graph = Graph::new();
        let (id, log) = observed_array(&graph, &[5, 6, 7]);
        let arr = graph.array(id).unwrap();
        assert_eq!(arr.remove(1_usize), Some(Value::from(6)));
        assert_eq!(arr.remove(Value::from(7)), Some(Value::from(7)));
        assert_eq!(arr.remove(Value::from(42)), None);
        assert_eq!(arr.remove(RemoveTarget::Index(10)), None);
        assert_eq!(arr.items(), nums(&[5]));
        assert_eq!(log.borrow().len(), 2, "misses emit nothing");
    }

    #[test]
    fn unconverted_arrays_mutate_silently() {
        let graph = Graph::new();
        let arr = graph.new_array(nums(&[1]));
        let id = arr.as_node().unwrap();
        let child = graph.new_object([("x", 1)]);
        let arr = graph.array(id).unwrap();
        arr.push([child.clone()]);
        assert_eq!(arr.len(), 2);
        assert!(!graph.is_converted(child.as_node().unwrap()));
    }

    #[test]
    fn array_view_rejects_objects() {
        let graph = Graph::new();
        let obj = graph.new_object([("a", 1)]);
        assert!(graph.array(obj.as_node().unwrap()).is_none());
    }
}
