//! Scheduling policy.

use serde::{Deserialize, Serialize};

/// Whether scheduling hooks are live for the current execution.
///
/// Under `Production` every hook in [`crate::runtime::context`] returns
/// immediately. Under `Systematic` each hook is a scheduling point owned by
/// the run's scheduler. The policy is fixed when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SchedulingPolicy {
    /// Hooks are no-ops.
    #[default]
    Production,
    /// Hooks consult the exploration strategy.
    Systematic,
}

impl SchedulingPolicy {
    /// Returns true when hooks must call into the scheduler.
    #[must_use]
    pub const fn is_systematic(self) -> bool {
        matches!(self, Self::Systematic)
    }
}
