//! Synchronization primitives that cooperate with the controlled scheduler.
//!
//! # Primitives
//!
//! - [`Mutex`]: mutual exclusion; acquire and release are scheduling points
//! - [`Signal`]: auto-reset event; waiting on an unset signal disables the
//!   caller
//!
//! Blocking waits are never suppressed. Outside a run both primitives fall
//! back to ordinary blocking behavior.

mod mutex;
mod signal;

pub use mutex::{Mutex, MutexGuard, TryLockError};
pub use signal::Signal;
