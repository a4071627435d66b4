//! Operations: the unit of schedulable work.
//!
//! An operation is backed by one OS thread. The thread only runs user code
//! while the scheduler has marked its operation active; otherwise it is parked
//! on the operation's own condition variable.

use core::fmt;
use std::sync::Arc;

use parking_lot::Condvar;

use crate::types::{OperationId, ResourceId};

/// What an operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// The test body.
    Root,
    /// A closure started with [`Runtime::spawn`](crate::runtime::Runtime::spawn).
    Task,
    /// An actor's dequeue loop.
    Actor,
}

/// Why a scheduling point was reached. Only used for diagnostics; strategies
/// see the yielding flag, never the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulingPointKind {
    /// An explicit `interleave()` hook.
    Interleave,
    /// An explicit `yield_now()` hook.
    Yield,
    /// A new operation was created.
    Create,
    /// An event was delivered to an idle actor.
    Send,
    /// An actor finished handling one event.
    Actor,
    /// An actor found its mailbox empty.
    Receive,
    /// Waiting for another operation to complete.
    Join,
    /// Before or after acquiring a controlled mutex.
    Acquire,
    /// After releasing a controlled mutex.
    Release,
    /// Waiting on a controlled signal.
    Wait,
    /// After raising a controlled signal.
    Notify,
    /// The calling operation completed.
    Completion,
}

/// What a blocked operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockReason {
    /// Completion of another operation.
    Join(OperationId),
    /// Release of a controlled mutex.
    Lock(ResourceId),
    /// A controlled signal being raised.
    Signal(ResourceId),
    /// An event arriving in the actor's mailbox.
    Receive,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(op) => write!(f, "waiting for {op} to complete"),
            Self::Lock(res) => write!(f, "waiting to acquire mutex {res}"),
            Self::Signal(res) => write!(f, "waiting on signal {res}"),
            Self::Receive => write!(f, "waiting to receive an event"),
        }
    }
}

/// Status of a live operation. Completed operations leave the scheduler's
/// live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    /// Eligible to be chosen at the next scheduling point.
    Enabled,
    /// Not eligible until the reason is resolved.
    Blocked(BlockReason),
}

impl OperationStatus {
    /// Returns true if the operation may be chosen.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Scheduler-side record of one operation.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) id: OperationId,
    pub(crate) kind: OperationKind,
    pub(crate) status: OperationStatus,
    /// Depth of nested `suppress()` calls.
    pub(crate) suppression: u32,
    pub(crate) parker: Arc<Condvar>,
}

impl Operation {
    pub(crate) fn new(id: OperationId, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            status: OperationStatus::Enabled,
            suppression: 0,
            parker: Arc::new(Condvar::new()),
        }
    }

    /// Marks the operation blocked.
    pub(crate) fn block(&mut self, reason: BlockReason) {
        self.status = OperationStatus::Blocked(reason);
    }

    /// Returns true if the operation is an actor waiting for its mailbox.
    /// Such an actor is idle, not stuck.
    pub(crate) fn is_idle_actor(&self) -> bool {
        self.kind == OperationKind::Actor
            && self.status == OperationStatus::Blocked(BlockReason::Receive)
    }

    /// Re-enables the operation if it was blocked for `reason`.
    pub(crate) fn unblock_if(&mut self, reason: BlockReason) -> bool {
        if self.status == OperationStatus::Blocked(reason) {
            self.status = OperationStatus::Enabled;
            true
        } else {
            false
        }
    }
}
