//! An auto-reset signal: `notify` sets it, one `wait` consumes it.
//!
//! Under the controlled scheduler a waiter on an unset signal is disabled
//! until someone notifies. If nobody ever does, the run ends as a deadlock
//! naming the signal.

use core::fmt;

use parking_lot::{Condvar, Mutex};

use crate::runtime::context;
use crate::runtime::operation::{BlockReason, SchedulingPointKind};
use crate::types::ResourceId;

/// Auto-reset event.
pub struct Signal {
    resource: Option<ResourceId>,
    set: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resource: context::current().map(|c| c.scheduler.allocate_resource()),
            set: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// The resource id shown in deadlock reports, inside a run.
    #[must_use]
    pub const fn resource(&self) -> Option<ResourceId> {
        self.resource
    }

    /// Returns true if the signal is set and not yet consumed.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Sets the signal, waking one waiter. Inside a run the effect sits
    /// between two scheduling points.
    pub fn notify(&self) {
        let (Some(resource), Some(current)) = (self.resource, context::current()) else {
            *self.set.lock() = true;
            self.condvar.notify_one();
            return;
        };
        current.scheduler.schedule_next_operation(
            current.operation,
            SchedulingPointKind::Notify,
            false,
            false,
        );
        *self.set.lock() = true;
        let woken = current.scheduler.unblock(BlockReason::Signal(resource));
        tracing::trace!(operation = %current.operation, resource = %resource, woken, "signal notified");
        current.scheduler.schedule_next_operation(
            current.operation,
            SchedulingPointKind::Notify,
            false,
            false,
        );
    }

    /// Waits until the signal is set, then resets it.
    pub fn wait(&self) {
        let (Some(resource), Some(current)) = (self.resource, context::current()) else {
            let mut set = self.set.lock();
            while !*set {
                self.condvar.wait(&mut set);
            }
            *set = false;
            return;
        };
        let scheduler = current.scheduler;
        let op = current.operation;
        scheduler.schedule_next_operation(op, SchedulingPointKind::Wait, false, false);
        while !*self.set.lock() {
            scheduler.block_current(op, BlockReason::Signal(resource));
            scheduler.schedule_next_operation(op, SchedulingPointKind::Wait, false, false);
        }
        *self.set.lock() = false;
        tracing::trace!(operation = %op, resource = %resource, "signal consumed");
        scheduler.schedule_next_operation(op, SchedulingPointKind::Wait, false, false);
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("resource", &self.resource)
            .field("set", &self.is_set())
            .finish()
    }
}
