//! A mutex whose acquisition and release are scheduling points.
//!
//! Inside a run the lock is logical: the scheduler decides who gets it, and
//! an operation that finds it held is disabled until the holder releases it.
//! A mutex created outside any run behaves like an ordinary blocking mutex.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::sync::Mutex;
//!
//! let counter = Arc::new(Mutex::new(0));
//! let c = Arc::clone(&counter);
//! let task = runtime.spawn(move || *c.lock() += 1);
//! *counter.lock() += 1;
//! task.join();
//! ```

use core::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::runtime::context;
use crate::runtime::operation::{BlockReason, SchedulingPointKind};
use crate::runtime::Scheduler;
use crate::types::{OperationId, ResourceId};

/// Error returned when trying to lock without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryLockError {
    /// The mutex is currently locked.
    Locked,
}

impl fmt::Display for TryLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "mutex is locked"),
        }
    }
}

impl std::error::Error for TryLockError {}

/// Mutual exclusion with controlled acquisition.
pub struct Mutex<T> {
    /// Set when created inside a run.
    resource: Option<ResourceId>,
    /// Logical lock state under the controlled scheduler.
    locked: parking_lot::Mutex<bool>,
    data: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            resource: context::current().map(|c| c.scheduler.allocate_resource()),
            locked: parking_lot::Mutex::new(false),
            data: parking_lot::Mutex::new(value),
        }
    }

    /// Returns true if the mutex is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        if self.resource.is_some() {
            *self.locked.lock()
        } else {
            self.data.is_locked()
        }
    }

    /// Acquires the mutex, waiting if necessary.
    ///
    /// Under the controlled scheduler there is a scheduling point before the
    /// attempt and another once the lock is held. A contended attempt
    /// disables the caller until the holder releases.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let (Some(resource), Some(current)) = (self.resource, context::current()) else {
            return MutexGuard {
                data: self.data.lock(),
                release: None,
            };
        };
        let scheduler = current.scheduler;
        let op = current.operation;
        scheduler.schedule_next_operation(op, SchedulingPointKind::Acquire, false, false);
        while *self.locked.lock() {
            tracing::trace!(operation = %op, resource = %resource, "mutex contended");
            scheduler.block_current(op, BlockReason::Lock(resource));
            scheduler.schedule_next_operation(op, SchedulingPointKind::Acquire, false, false);
        }
        let guard = self.acquire(resource, Arc::clone(&scheduler), op);
        scheduler.schedule_next_operation(op, SchedulingPointKind::Acquire, false, false);
        guard
    }

    /// Acquires the mutex only if it is free.
    ///
    /// # Errors
    ///
    /// Returns [`TryLockError::Locked`] if another holder has it.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>, TryLockError> {
        let (Some(resource), Some(current)) = (self.resource, context::current()) else {
            return self
                .data
                .try_lock()
                .map(|data| MutexGuard {
                    data,
                    release: None,
                })
                .ok_or(TryLockError::Locked);
        };
        let scheduler = current.scheduler;
        let op = current.operation;
        scheduler.schedule_next_operation(op, SchedulingPointKind::Acquire, false, false);
        let attempt = if *self.locked.lock() {
            Err(TryLockError::Locked)
        } else {
            Ok(self.acquire(resource, Arc::clone(&scheduler), op))
        };
        scheduler.schedule_next_operation(op, SchedulingPointKind::Acquire, false, false);
        attempt
    }

    fn acquire(
        &self,
        resource: ResourceId,
        scheduler: Arc<Scheduler>,
        op: OperationId,
    ) -> MutexGuard<'_, T> {
        *self.locked.lock() = true;
        tracing::trace!(operation = %op, resource = %resource, "mutex acquired");
        MutexGuard {
            data: self.data.lock(),
            release: Some(Release {
                locked: &self.locked,
                resource,
                scheduler,
                op,
            }),
        }
    }

    /// Returns a mutable reference to the data; no locking is needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the mutex, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("resource", &self.resource)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Releases the logical lock: wakes contenders, then reaches a `Release`
/// scheduling point.
struct Release<'a> {
    locked: &'a parking_lot::Mutex<bool>,
    resource: ResourceId,
    scheduler: Arc<Scheduler>,
    op: OperationId,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        *self.locked.lock() = false;
        // An unwinding holder is leaving a finished run; another scheduling
        // point here would panic twice.
        if std::thread::panicking() {
            return;
        }
        let woken = self.scheduler.unblock(BlockReason::Lock(self.resource));
        tracing::trace!(operation = %self.op, resource = %self.resource, woken, "mutex released");
        self.scheduler
            .schedule_next_operation(self.op, SchedulingPointKind::Release, false, false);
    }
}

/// Guard for a held [`Mutex`]. The lock is released on drop.
pub struct MutexGuard<'a, T> {
    // Field order matters: the data lock must be dropped before the release
    // point hands control to another operation.
    data: parking_lot::MutexGuard<'a, T>,
    release: Option<Release<'a>>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard")
            .field("data", &*self.data)
            .field("controlled", &self.release.is_some())
            .finish()
    }
}
