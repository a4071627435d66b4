//! Monitors and liveness checking.
//!
//! A monitor is a state machine that observes the program. It receives
//! events synchronously from any operation, asserts safety properties in its
//! actions, and marks states *hot* (progress owed) or *cold* (progress made).
//! The [`liveness`] checker turns hot states that never cool down into
//! liveness violations.
//!
//! Monitors are defined with the same builder as actors, finished with
//! [`StateMachineBuilder::build_monitor`](crate::actor::StateMachineBuilder::build_monitor).
//! They may `goto` and `raise`, but never push, pop, halt, send, or create.

pub(crate) mod instance;
pub mod liveness;
pub(crate) mod registry;

use core::fmt;

use crate::actor::definition::MachineDefinition;

pub use liveness::{HotMonitor, LivenessSettings};

/// Whether a monitor state owes progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Temperature {
    /// Progress is owed; staying here forever is a liveness bug.
    Hot,
    /// No obligation.
    #[default]
    Cold,
}

/// A validated monitor definition.
pub struct MonitorDefinition<M> {
    machine: MachineDefinition<M>,
}

impl<M> MonitorDefinition<M> {
    pub(crate) const fn new(machine: MachineDefinition<M>) -> Self {
        Self { machine }
    }

    /// The monitor's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.machine.name()
    }

    /// Qualified name of the start state.
    #[must_use]
    pub fn start_state(&self) -> &str {
        self.machine.start_state()
    }

    /// The underlying state machine.
    #[must_use]
    pub const fn machine(&self) -> &MachineDefinition<M> {
        &self.machine
    }
}

impl<M> fmt::Debug for MonitorDefinition<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MonitorDefinition").field(&self.machine).finish()
    }
}
