//! The systematic runtime.
//!
//! This module contains the core runtime machinery:
//!
//! - [`scheduler`]: the controlled scheduler that serializes operations
//! - [`operation`]: operation identity, status, and blocking reasons
//! - [`context`]: per-thread operation context and instrumentation hooks
//! - [`handle`]: the [`Runtime`] handle passed to test bodies
//! - [`task_handle`]: [`TaskHandle`] for joining spawned tasks
//!
//! # Scheduling points
//!
//! Every operation runs on its own OS thread, but only one of them runs at a
//! time. Control changes hands only at scheduling points:
//!
//! | Point | Suppressible | Raised by |
//! |-------|--------------|-----------|
//! | `Interleave`, `Yield` | yes | [`context::interleave`], [`context::yield_now`] |
//! | `Create` | no | spawning a task or creating an actor |
//! | `Send` | no | waking an idle actor |
//! | `Actor`, `Receive` | no | the actor event loop |
//! | `Join` | first point only | [`TaskHandle::join`] |
//! | `Acquire`, `Release` | no | [`crate::sync::Mutex`] |
//! | `Wait`, `Notify` | no | [`crate::sync::Signal`] |
//! | `Completion` | no | an operation finishing |

pub mod context;
pub mod handle;
pub mod operation;
pub mod scheduler;
pub mod task_handle;

pub use context::{
    current_operation, fair_random_boolean, interleave, random_boolean, random_integer,
    resume, scheduling_policy, suppress, yield_now,
};
pub use handle::Runtime;
pub use operation::{BlockReason, OperationKind, OperationStatus, SchedulingPointKind};
pub use scheduler::{ExecutionCanceled, RunOutcome, Scheduler};
pub use task_handle::TaskHandle;
