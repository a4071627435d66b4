//! Actors: event-driven state machines running under the controlled
//! scheduler.
//!
//! - [`definition`]: builders and validated, flattened machine definitions
//! - [`event`]: the [`Event`] trait and [`HaltEvent`]
//! - [`context`]: the [`Context`] handed to every action
//!
//! Each actor owns a FIFO mailbox and a stack of states. Sending never
//! blocks; a send to an idle actor wakes it and is a scheduling point.

pub mod context;
pub mod definition;
pub mod event;
pub(crate) mod machine;
pub(crate) mod registry;

pub use context::Context;
pub use definition::{Action, GroupBuilder, MachineDefinition, StateBuilder, StateMachineBuilder};
pub use event::{Event, HaltEvent};
