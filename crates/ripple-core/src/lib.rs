#![forbid(unsafe_code)]

//! Core building blocks for ripple.
//!
//! This crate provides:
//! - [`EventBus`] for named-event publish/subscribe with snapshot dispatch
//! - [`Value`] and [`NodeId`] for values stored in an observed graph
//! - [`Change`] and [`Mutation`], the event contract observers exchange
//! - [`RuntimeConfig`] and [`RippleError`]

pub mod bus;
pub mod change;
pub mod config;
pub mod error;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod path;
pub mod value;

pub use bus::{EventBus, FAST_ARITY, Listener, Subscription};
pub use change::{ArrayMethod, Change, ChangeBus, Mutation, MutationResult, hook_event};
pub use config::RuntimeConfig;
pub use error::{Result, RippleError};
pub use value::{HostRef, NodeId, Value};
