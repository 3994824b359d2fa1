#![forbid(unsafe_code)]

//! The change-event contract shared by every observer bus.
//!
//! Observers exchange four event kinds, each named after what happened to
//! a dotted key:
//!
//! | Event    | Payload                                   |
//! |----------|-------------------------------------------|
//! | `get`    | [`Change::Get`]                           |
//! | `set`    | [`Change::Set`]                           |
//! | `mutate` | [`Change::Mutate`] with a [`Mutation`]    |
//! | `delete` | [`Change::Delete`]                        |
//!
//! Lifecycle events (`hook:<name>`) carry no payload.

use std::fmt;
use std::rc::Rc;

use crate::bus::EventBus;
use crate::value::Value;

/// Event name for reads observed during dependency collection.
pub const GET: &str = "get";
/// Event name for property writes.
pub const SET: &str = "set";
/// Event name for array structure changes.
pub const MUTATE: &str = "mutate";
/// Event name for explicit key removal.
pub const DELETE: &str = "delete";

/// Bus carrying [`Change`] payloads.
pub type ChangeBus = EventBus<Change>;

/// Build the name of a lifecycle event, e.g. `hook:attached`.
#[must_use]
pub fn hook_event(name: &str) -> String {
    format!("hook:{name}")
}

/// Array operations that are intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    /// Insert at the end.
    Push,
    /// Remove from the end.
    Pop,
    /// Insert at the front.
    Unshift,
    /// Remove from the front.
    Shift,
    /// Remove and/or insert a range.
    Splice,
    Sort,
    Reverse,
}

impl ArrayMethod {
    /// Conventional method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Unshift => "unshift",
            Self::Shift => "shift",
            Self::Splice => "splice",
            Self::Sort => "sort",
            Self::Reverse => "reverse",
        }
    }

    /// Sort and reverse move elements without adding or removing any.
    #[must_use]
    pub const fn is_reorder(self) -> bool {
        matches!(self, Self::Sort | Self::Reverse)
    }
}

impl fmt::Display for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the native operation returned.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult {
    /// New length (`push`, `unshift`).
    Length(usize),
    /// The removed element, `None` when the array was empty (`pop`, `shift`).
    Item(Option<Value>),
    /// Removed elements (`splice`).
    Items(Vec<Value>),
    /// The array itself was reordered (`sort`, `reverse`).
    Reordered,
}

/// Description of one intercepted array operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub method: ArrayMethod,
    /// Arguments of the call, in order.
    pub args: Vec<Value>,
    pub result: MutationResult,
    /// Elements added; `None` for operations that cannot insert.
    pub inserted: Option<Vec<Value>>,
    /// Elements removed; `None` for operations that cannot remove.
    pub removed: Option<Vec<Value>>,
    /// Array length after the operation.
    pub length: usize,
}

/// Payload of an observer event.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// `key` was read during dependency collection.
    Get { key: String },
    /// `key` now holds `value`. `propagate` asks owners of the containing
    /// value to report a change as well.
    Set {
        key: String,
        value: Value,
        propagate: bool,
    },
    /// The array at `key` changed structure.
    Mutate {
        key: String,
        container: Value,
        mutation: Rc<Mutation>,
    },
    /// `key` was removed.
    Delete { key: String },
}

impl Change {
    /// Name of the bus event this payload travels on.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Get { .. } => GET,
            Self::Set { .. } => SET,
            Self::Mutate { .. } => MUTATE,
            Self::Delete { .. } => DELETE,
        }
    }

    /// The dotted key this change refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get { key }
            | Self::Set { key, .. }
            | Self::Mutate { key, .. }
            | Self::Delete { key } => key,
        }
    }

    /// Same change re-addressed to `key`.
    #[must_use]
    pub fn with_key(&self, key: String) -> Self {
        let mut out = self.clone();
        match &mut out {
            Self::Get { key: k }
            | Self::Set { key: k, .. }
            | Self::Mutate { key: k, .. }
            | Self::Delete { key: k } => *k = key,
        }
        out
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl Into<Value>, propagate: bool) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            propagate,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Send `change` on `bus` under its own event name.
pub fn send(bus: &ChangeBus, change: Change) {
    bus.emit(change.event_name(), std::slice::from_ref(&change));
}
