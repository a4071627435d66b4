//! Schedule traces for deterministic replay.
//!
//! - [`schedule`]: the in-memory trace recorded by the scheduler
//! - [`file`]: JSON persistence for traces

pub mod file;
pub mod schedule;

pub use file::{load_trace, save_trace, TraceFileError, TRACE_FILE_VERSION};
pub use schedule::{Choice, Decision, ScheduleTrace};
