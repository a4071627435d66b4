//! The per-thread operation context and the public instrumentation hooks.
//!
//! Every operation thread carries the scheduler of its run and its own
//! operation id. Code running outside any run has no context, and every hook
//! here degrades to its production behavior: scheduling hooks return
//! immediately and value choices come from an unseeded local generator.
//!
//! ```ignore
//! use lockstep::runtime::context;
//!
//! context::interleave();          // optional exploration point
//! context::suppress();
//! critical_section();             // no optional points in here
//! context::resume();
//! if context::fair_random_boolean() { /* ... */ }
//! ```

use core::cell::RefCell;
use std::panic::Location;
use std::sync::Arc;

use super::operation::SchedulingPointKind;
use super::scheduler::Scheduler;
use crate::error::Error;
use crate::types::{OperationId, SchedulingPolicy};
use crate::util::{stable_hash, DetRng};

#[derive(Clone)]
pub(crate) struct Current {
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) operation: OperationId,
}

thread_local! {
    static CURRENT: RefCell<Option<Current>> = const { RefCell::new(None) };
    static FALLBACK_RNG: RefCell<DetRng> = RefCell::new(DetRng::new(fallback_seed()));
}

fn fallback_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

/// Restores the previous context on drop.
pub(crate) struct ContextGuard {
    previous: Option<Current>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Installs `operation` of `scheduler` as the current context.
pub(crate) fn enter(scheduler: Arc<Scheduler>, operation: OperationId) -> ContextGuard {
    let previous = CURRENT.with(|cell| {
        cell.borrow_mut().replace(Current {
            scheduler,
            operation,
        })
    });
    ContextGuard { previous }
}

pub(crate) fn current() -> Option<Current> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// The operation running on this thread, if any.
#[must_use]
pub fn current_operation() -> Option<OperationId> {
    CURRENT.with(|cell| cell.borrow().as_ref().map(|c| c.operation))
}

/// The current operation, or ends the run of `scheduler` when called from a
/// thread it does not control.
pub(crate) fn require_operation(scheduler: &Scheduler) -> OperationId {
    if let Some(op) = current_operation() {
        return op;
    }
    scheduler.abort(Error::configuration(
        "runtime used from a thread that is not a controlled operation",
    ));
    super::scheduler::cancel_current()
}

/// The scheduling policy in effect on this thread.
#[must_use]
pub fn scheduling_policy() -> SchedulingPolicy {
    if current().is_some() {
        SchedulingPolicy::Systematic
    } else {
        SchedulingPolicy::Production
    }
}

/// Optional exploration point. Skipped while suppressed.
pub fn interleave() {
    if let Some(c) = current() {
        c.scheduler
            .schedule_next_operation(c.operation, SchedulingPointKind::Interleave, true, false);
    }
}

/// Optional exploration point that deprioritizes the caller for this one
/// decision. Skipped while suppressed.
pub fn yield_now() {
    if let Some(c) = current() {
        c.scheduler
            .schedule_next_operation(c.operation, SchedulingPointKind::Yield, true, true);
    }
}

/// Starts a region in which `interleave` and `yield_now` are no-ops.
/// Regions nest; blocking waits are never suppressed.
pub fn suppress() {
    if let Some(c) = current() {
        c.scheduler.suppress_scheduling(c.operation);
    }
}

/// Ends one level of [`suppress`].
pub fn resume() {
    if let Some(c) = current() {
        c.scheduler.resume_scheduling(c.operation);
    }
}

/// A nondeterministic boolean, recorded in the trace.
#[must_use]
pub fn random_boolean() -> bool {
    match current() {
        Some(c) => c.scheduler.next_boolean(c.operation, None),
        None => FALLBACK_RNG.with(|rng| rng.borrow_mut().next_bool()),
    }
}

/// A nondeterministic boolean that the strategy must not starve.
///
/// Fairness is tracked per call site, so a loop guarded by this call
/// eventually takes both branches.
#[must_use]
#[track_caller]
pub fn fair_random_boolean() -> bool {
    let site = call_site_key(Location::caller());
    match current() {
        Some(c) => c.scheduler.next_boolean(c.operation, Some(site)),
        None => FALLBACK_RNG.with(|rng| rng.borrow_mut().next_bool()),
    }
}

/// A nondeterministic integer in `0..bound`, recorded in the trace.
///
/// # Panics
///
/// Outside a run, panics if `bound` is zero. Inside a run a zero bound is
/// reported as a configuration error.
#[must_use]
pub fn random_integer(bound: u64) -> u64 {
    match current() {
        Some(c) => c.scheduler.next_integer(c.operation, bound),
        None => FALLBACK_RNG.with(|rng| rng.borrow_mut().next_below(bound)),
    }
}

/// Checks a safety property. A failure ends the run with an assertion
/// failure carrying `message`.
///
/// # Panics
///
/// Outside a run, a failed assertion panics.
pub fn assert(condition: bool, message: &str) {
    if condition {
        return;
    }
    match current() {
        Some(c) if !std::thread::panicking() => c
            .scheduler
            .fail(Some(c.operation), Error::assertion(message)),
        _ => panic!("{message}"),
    }
}

pub(crate) fn call_site_key(location: &Location<'_>) -> u64 {
    stable_hash(&(location.file(), location.line(), location.column()))
}
