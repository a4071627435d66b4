//! Identifier types for scheduled entities.
//!
//! Ids are allocated by the per-run [`Scheduler`](crate::runtime::Scheduler)
//! in strictly increasing order, which makes them stable across a run and its
//! replay: the same program performing the same decisions allocates the same
//! ids.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Identifier of a schedulable operation.
///
/// Id `0` is always the root operation that runs the test body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    /// The operation running the test closure.
    pub const ROOT: Self = Self(0);

    /// Creates an id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.0)
    }
}

/// Identifier of an actor instance.
///
/// Every actor is backed by exactly one operation; the actor id carries that
/// operation id together with the machine's type name for diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId {
    operation: OperationId,
    name: &'static str,
}

impl ActorId {
    pub(crate) const fn new(operation: OperationId, name: &'static str) -> Self {
        Self { operation, name }
    }

    /// The operation that executes this actor.
    #[must_use]
    pub const fn operation(self) -> OperationId {
        self.operation
    }

    /// The machine type name the actor was created from.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.operation.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.operation.0)
    }
}

/// Identifier of a controlled synchronization resource (mutex, signal).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Res({})", self.0)
    }
}
