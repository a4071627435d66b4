//! Lockstep: systematic concurrency testing for Rust.
//!
//! # Overview
//!
//! Lockstep runs a concurrent test body many times, each time under a
//! different interleaving chosen by an exploration strategy. Only one
//! operation runs at any moment; control changes hands at well-defined
//! scheduling points, and every decision is recorded in a trace that replays
//! the run exactly.
//!
//! # Core Guarantees
//!
//! - **Serialized execution**: exactly one operation runs between two
//!   scheduling points
//! - **Reproducibility**: a bug's trace replays to the same verdict
//! - **Deadlock detection**: a run with no enabled operation and blocked
//!   non-idle operations is reported with who waits on what
//! - **Liveness checking**: hot monitors that survive a fair repeating cycle
//!   are reported as liveness violations
//!
//! # Module Structure
//!
//! - [`types`]: identifiers and the scheduling policy
//! - [`runtime`]: the controlled scheduler, the [`Runtime`] handle, and
//!   instrumentation hooks
//! - [`actor`]: event-driven state machines with inheritance and groups
//! - [`monitor`]: safety/liveness monitors and the liveness checker
//! - [`sync`]: controlled mutex and signal
//! - [`lab`]: strategies, configuration, the test engine, and reports
//! - [`trace`]: schedule traces and their JSON file format
//! - [`error`]: error kinds and verdicts
//! - [`util`]: deterministic RNG and hashing
//!
//! # Example
//!
//! ```ignore
//! use lockstep::{StrategyKind, TestConfig, TestEngine};
//!
//! let mut engine = TestEngine::new(TestConfig::new(StrategyKind::Dfs))?;
//! let report = engine.run(|runtime| {
//!     let counter = Arc::new(lockstep::sync::Mutex::new(0));
//!     let c = Arc::clone(&counter);
//!     let task = runtime.spawn(move || *c.lock() += 1);
//!     *counter.lock() += 1;
//!     task.join();
//!     runtime.assert(*counter.lock() == 2, "lost update");
//! });
//! assert!(report.is_success(), "{report}");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod actor;
pub mod error;
pub mod lab;
pub mod monitor;
pub mod runtime;
pub mod sync;
pub mod trace;
pub mod types;
pub mod util;

// Re-exports for convenient access to core types
pub use actor::{Context, Event, HaltEvent, MachineDefinition, StateMachineBuilder};
pub use error::{Error, ErrorCategory, ErrorKind, Result, RunDisposition};
pub use lab::{BugReport, StrategyKind, TestConfig, TestEngine, TestReport};
pub use monitor::{MonitorDefinition, Temperature};
pub use runtime::{Runtime, TaskHandle};
pub use trace::{Choice, ScheduleTrace};
pub use types::{ActorId, OperationId, ResourceId, SchedulingPolicy};
