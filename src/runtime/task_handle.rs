//! TaskHandle for joining spawned tasks.
//!
//! `TaskHandle<T>` is returned by [`Runtime::spawn`](super::Runtime::spawn)
//! and lets the spawner wait for the task's result. Joining is a blocking
//! wait under the controlled scheduler: the caller is disabled until the
//! task completes.

use std::sync::Arc;

use parking_lot::Mutex;

use super::context;
use super::operation::{BlockReason, SchedulingPointKind};
use super::scheduler::Scheduler;
use crate::error::Error;
use crate::types::OperationId;

/// A handle to a spawned task.
///
/// Dropping the handle does not cancel the task.
///
/// # Example
///
/// ```ignore
/// let handle = runtime.spawn(|| 42);
/// assert_eq!(handle.join(), 42);
/// ```
pub struct TaskHandle<T> {
    operation: OperationId,
    result: Arc<Mutex<Option<T>>>,
    scheduler: Arc<Scheduler>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        operation: OperationId,
        result: Arc<Mutex<Option<T>>>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            operation,
            result,
            scheduler,
        }
    }

    /// The operation running the task.
    #[must_use]
    pub const fn operation(&self) -> OperationId {
        self.operation
    }

    /// Returns true once the task has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_completed(self.operation)
    }

    /// Waits for the task and returns its result.
    pub fn join(self) -> T {
        let current = context::require_operation(&self.scheduler);
        self.scheduler
            .schedule_next_operation(current, SchedulingPointKind::Join, true, false);
        while !self.scheduler.is_completed(self.operation) {
            self.scheduler
                .block_current(current, BlockReason::Join(self.operation));
            self.scheduler
                .schedule_next_operation(current, SchedulingPointKind::Join, false, false);
        }
        let result = self.result.lock().take();
        match result {
            Some(value) => value,
            None => self.scheduler.fail(
                Some(current),
                Error::internal(format!("{} completed without a result", self.operation)),
            ),
        }
    }
}

impl<T> core::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}
