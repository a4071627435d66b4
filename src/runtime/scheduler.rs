//! The controlled scheduler.
//!
//! One scheduler exists per run. It owns the live operations, the exploration
//! strategy, the schedule trace, and the liveness checker, all behind a single
//! mutex. Exactly one operation is *active* at any time; every other operation
//! thread is parked on its own condition variable until a scheduling decision
//! makes it active.
//!
//! A run ends when
//!
//! - every operation completed, or only idle actors remain (normal end),
//! - no operation is enabled while some are blocked on each other (deadlock),
//! - the step bound is reached, or
//! - a bug is reported (assertion, panic, liveness, replay divergence).
//!
//! Ending a run wakes every parked thread. Each of them unwinds out of user
//! code with an [`ExecutionCanceled`] payload, which the operation's thread
//! body swallows. Parked operations are abandoned, never drained.

use core::ops::Range;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::context;
use super::operation::{BlockReason, Operation, OperationKind, OperationStatus, SchedulingPointKind};
use crate::error::{Error, Result};
use crate::lab::strategy::ExplorationStrategy;
use crate::monitor::liveness::{LivenessChecker, LivenessSettings, Observation, StateObserver};
use crate::trace::{Choice, ScheduleTrace};
use crate::types::{OperationId, ResourceId};
use crate::util::stable_hash;

/// Unwind payload used to abandon a parked operation once its run is over.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionCanceled;

/// Unwinds the calling operation out of user code.
pub(crate) fn cancel_current() -> ! {
    panic::resume_unwind(Box::new(ExecutionCanceled))
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// All operations finished (or only idle actors remain).
    Completed,
    /// The step bound cut the run short.
    StepBoundReached,
    /// A bug verdict.
    Bug {
        /// The verdict.
        error: Error,
        /// Segment of the trace forming a liveness cycle, if any.
        cycle: Option<Range<usize>>,
    },
}

/// Everything the engine needs back from a finished run.
pub(crate) struct RunSummary {
    pub(crate) outcome: RunOutcome,
    pub(crate) trace: ScheduleTrace,
    pub(crate) steps: u64,
    pub(crate) strategy: Option<Box<dyn ExplorationStrategy>>,
}

/// Per-run limits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunSettings {
    pub(crate) max_steps: u64,
    pub(crate) liveness: LivenessSettings,
}

struct SchedulerState {
    /// Live operations only; an operation leaves this map when it completes.
    operations: BTreeMap<OperationId, Operation>,
    completed: BTreeSet<OperationId>,
    next_operation: u64,
    next_resource: u64,
    active: Option<OperationId>,
    strategy: Option<Box<dyn ExplorationStrategy>>,
    trace: ScheduleTrace,
    steps: u64,
    liveness: LivenessChecker,
    outcome: Option<RunOutcome>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl SchedulerState {
    fn enabled(&self) -> Vec<OperationId> {
        self.operations
            .values()
            .filter(|op| op.status.is_enabled())
            .map(|op| op.id)
            .collect()
    }

    fn fingerprint(&self, external: u64) -> u64 {
        let statuses: Vec<(OperationId, OperationStatus)> = self
            .operations
            .values()
            .map(|op| (op.id, op.status))
            .collect();
        stable_hash(&(external, statuses))
    }
}

/// The per-run controlled scheduler.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    done: Condvar,
    settings: RunSettings,
    observer: Option<Arc<dyn StateObserver>>,
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let Some(state) = self.state.try_lock() else {
            return f.debug_struct("Scheduler").finish_non_exhaustive();
        };
        f.debug_struct("Scheduler")
            .field("operations", &state.operations.len())
            .field("completed", &state.completed.len())
            .field("active", &state.active)
            .field("steps", &state.steps)
            .field("terminated", &state.outcome.is_some())
            .finish()
    }
}

impl Scheduler {
    pub(crate) fn new(
        strategy: Box<dyn ExplorationStrategy>,
        settings: RunSettings,
        observer: Option<Arc<dyn StateObserver>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState {
                operations: BTreeMap::new(),
                completed: BTreeSet::new(),
                next_operation: 0,
                next_resource: 0,
                active: None,
                strategy: Some(strategy),
                trace: ScheduleTrace::new(),
                steps: 0,
                liveness: LivenessChecker::new(settings.liveness),
                outcome: None,
                threads: Vec::new(),
            }),
            done: Condvar::new(),
            settings,
            observer,
        })
    }

    // ------------------------------------------------------------------
    // Operation lifecycle
    // ------------------------------------------------------------------

    /// Allocates an operation in the Enabled state.
    ///
    /// Returns `None` once the run is over.
    pub(crate) fn register_operation(&self, kind: OperationKind) -> Option<OperationId> {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return None;
        }
        let id = OperationId::new(state.next_operation);
        state.next_operation += 1;
        state.operations.insert(id, Operation::new(id, kind));
        tracing::trace!(operation = %id, ?kind, "registered operation");
        Some(id)
    }

    /// Allocates an id for a controlled resource.
    pub(crate) fn allocate_resource(&self) -> ResourceId {
        let mut state = self.state.lock();
        let id = ResourceId::new(state.next_resource);
        state.next_resource += 1;
        id
    }

    /// Registers an operation and starts its thread, parked until chosen.
    pub(crate) fn try_spawn(
        self: &Arc<Self>,
        kind: OperationKind,
        body: Box<dyn FnOnce(OperationId) + Send>,
    ) -> Result<OperationId> {
        let Some(id) = self.register_operation(kind) else {
            return Err(Error::internal("cannot create an operation after the run ended"));
        };
        let scheduler = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("lockstep-op-{}", id.as_u64()))
            .spawn(move || scheduler.run_operation(id, body))
            .map_err(|e| {
                Error::internal(format!("failed to start thread for {id}")).with_source(e)
            })?;
        self.state.lock().threads.push(handle);
        Ok(id)
    }

    /// Like [`Self::try_spawn`], but called from inside an operation: a
    /// failure ends the run.
    pub(crate) fn spawn_operation(
        self: &Arc<Self>,
        current: OperationId,
        kind: OperationKind,
        body: Box<dyn FnOnce(OperationId) + Send>,
    ) -> OperationId {
        match self.try_spawn(kind, body) {
            Ok(id) => id,
            Err(err) => {
                if self.is_terminated() {
                    cancel_current()
                }
                self.fail(Some(current), err)
            }
        }
    }

    fn run_operation(self: Arc<Self>, id: OperationId, body: Box<dyn FnOnce(OperationId) + Send>) {
        let _context = context::enter(Arc::clone(&self), id);
        {
            let mut state = self.state.lock();
            if self.park(&mut state, id).is_err() {
                return;
            }
        }
        match panic::catch_unwind(AssertUnwindSafe(|| body(id))) {
            Ok(()) => self.complete_operation(id),
            Err(payload) => {
                if !payload.is::<ExecutionCanceled>() {
                    self.record_panic(id, payload.as_ref());
                }
            }
        }
    }

    /// Hands control to `root` to start the run.
    pub(crate) fn start(&self, root: OperationId) {
        let mut state = self.state.lock();
        state.active = Some(root);
        if let Some(op) = state.operations.get(&root) {
            op.parker.notify_one();
        }
    }

    /// Marks `current` completed and schedules the next operation. The
    /// calling thread must not run user code afterwards.
    pub(crate) fn complete_operation(&self, current: OperationId) {
        {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.operations.remove(&current);
            state.completed.insert(current);
            let reason = BlockReason::Join(current);
            for op in state.operations.values_mut() {
                op.unblock_if(reason);
            }
            tracing::trace!(operation = %current, "operation completed");
        }
        let _ = self.schedule_point(current, SchedulingPointKind::Completion, false, false);
    }

    /// Blocks until the run ends, joins every operation thread, and returns
    /// the run's results.
    pub(crate) fn wait_for_termination(&self) -> RunSummary {
        let mut state = self.state.lock();
        while state.outcome.is_none() {
            self.done.wait(&mut state);
        }
        loop {
            let threads = std::mem::take(&mut state.threads);
            if threads.is_empty() {
                break;
            }
            MutexGuard::unlocked(&mut state, || {
                for handle in threads {
                    let _ = handle.join();
                }
            });
        }
        RunSummary {
            outcome: state.outcome.clone().unwrap_or(RunOutcome::Completed),
            trace: std::mem::take(&mut state.trace),
            steps: state.steps,
            strategy: state.strategy.take(),
        }
    }

    // ------------------------------------------------------------------
    // Scheduling points
    // ------------------------------------------------------------------

    /// The central scheduling point.
    ///
    /// Consults the strategy, records the decision, releases the chosen
    /// operation, and parks the caller until it is chosen again. A
    /// suppressible point is skipped while the caller has suppression active.
    /// If the run ends, the caller unwinds.
    pub(crate) fn schedule_next_operation(
        &self,
        current: OperationId,
        kind: SchedulingPointKind,
        is_suppressible: bool,
        is_yielding: bool,
    ) {
        if thread::panicking() {
            return;
        }
        if self
            .schedule_point(current, kind, is_suppressible, is_yielding)
            .is_err()
        {
            cancel_current()
        }
    }

    fn schedule_point(
        &self,
        current: OperationId,
        kind: SchedulingPointKind,
        is_suppressible: bool,
        is_yielding: bool,
    ) -> core::result::Result<(), ExecutionCanceled> {
        let observation = self.observe_if_live();
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return Err(ExecutionCanceled);
        }
        if is_suppressible
            && state
                .operations
                .get(&current)
                .is_some_and(|op| op.suppression > 0)
        {
            return Ok(());
        }
        let enabled = state.enabled();
        if enabled.is_empty() {
            drop(state);
            self.finish_without_enabled();
            return Err(ExecutionCanceled);
        }
        if state.steps >= self.settings.max_steps {
            tracing::warn!(steps = state.steps, "step bound reached");
            self.terminate(&mut state, RunOutcome::StepBoundReached);
            return Err(ExecutionCanceled);
        }

        state.steps += 1;
        let decision = {
            let SchedulerState {
                strategy, trace, ..
            } = &mut *state;
            match strategy.as_mut() {
                Some(strategy) => strategy.next_operation(&enabled, current, is_yielding, trace),
                None => Err(Error::internal("no exploration strategy installed")),
            }
        };
        let next = match decision {
            Ok(next) if enabled.contains(&next) => next,
            Ok(next) => {
                let err = Error::internal(format!("strategy chose {next}, which is not enabled"));
                self.terminate_with_bug(&mut state, Some(current), err, None);
                return Err(ExecutionCanceled);
            }
            Err(err) => {
                self.terminate_with_bug(&mut state, Some(current), err, None);
                return Err(ExecutionCanceled);
            }
        };

        // The decision is part of the trace even when the liveness check
        // ends the run on it, so that a replay reaches the same verdict.
        let trace_index = state.trace.len();
        state.trace.push(Choice::Operation(next));
        if let Some(observation) = observation {
            let fingerprint = state.fingerprint(observation.fingerprint);
            let verdict = state.liveness.record(
                fingerprint,
                &observation.hot,
                next,
                &enabled,
                trace_index,
            );
            if let Some(verdict) = verdict {
                self.terminate_with_bug(&mut state, Some(current), verdict.error, verdict.cycle);
                return Err(ExecutionCanceled);
            }
        }

        tracing::debug!(
            step = state.steps,
            point = ?kind,
            current = %current,
            next = %next,
            enabled = enabled.len(),
            "scheduling decision"
        );

        state.active = Some(next);
        if next == current {
            return Ok(());
        }
        if let Some(op) = state.operations.get(&next) {
            op.parker.notify_one();
        }
        if state.completed.contains(&current) {
            return Ok(());
        }
        self.park(&mut state, current)
    }

    fn park(
        &self,
        state: &mut MutexGuard<'_, SchedulerState>,
        me: OperationId,
    ) -> core::result::Result<(), ExecutionCanceled> {
        let Some(parker) = state.operations.get(&me).map(|op| Arc::clone(&op.parker)) else {
            return Err(ExecutionCanceled);
        };
        while state.outcome.is_none() && state.active != Some(me) {
            parker.wait(state);
        }
        if state.outcome.is_some() {
            Err(ExecutionCanceled)
        } else {
            Ok(())
        }
    }

    /// No operation is enabled: either the run ended normally or it is
    /// deadlocked.
    fn finish_without_enabled(&self) {
        let hot = self
            .observer
            .as_ref()
            .map(|observer| observer.observe().hot)
            .unwrap_or_default();
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return;
        }

        let stuck: Vec<(OperationId, BlockReason)> = state
            .operations
            .values()
            .filter(|op| !op.is_idle_actor())
            .filter_map(|op| match op.status {
                OperationStatus::Blocked(reason) => Some((op.id, reason)),
                OperationStatus::Enabled => None,
            })
            .collect();

        if stuck.is_empty() {
            match LivenessChecker::end_of_run(&hot) {
                Some(err) => self.terminate_with_bug(&mut state, None, err, None),
                None => self.terminate(&mut state, RunOutcome::Completed),
            }
            return;
        }

        let detail = stuck
            .iter()
            .map(|(op, reason)| format!("{op} is {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        let err = Error::deadlock(format!("Deadlock detected. {detail}."));
        self.terminate_with_bug(&mut state, None, err, None);
    }

    fn observe_if_live(&self) -> Option<Observation> {
        if !self.settings.liveness.is_active() {
            return None;
        }
        self.observer.as_ref().map(|observer| observer.observe())
    }

    // ------------------------------------------------------------------
    // Suppression and blocking
    // ------------------------------------------------------------------

    /// Enters a region where suppressible points of `current` are skipped.
    pub(crate) fn suppress_scheduling(&self, current: OperationId) {
        if let Some(op) = self.state.lock().operations.get_mut(&current) {
            op.suppression += 1;
        }
    }

    /// Leaves one level of suppression.
    pub(crate) fn resume_scheduling(&self, current: OperationId) {
        if let Some(op) = self.state.lock().operations.get_mut(&current) {
            op.suppression = op.suppression.saturating_sub(1);
        }
    }

    /// Marks `current` blocked. The caller must follow up with a
    /// non-suppressible scheduling point.
    pub(crate) fn block_current(&self, current: OperationId, reason: BlockReason) {
        if let Some(op) = self.state.lock().operations.get_mut(&current) {
            op.block(reason);
        }
    }

    /// Re-enables every operation blocked for `reason`; returns how many.
    pub(crate) fn unblock(&self, reason: BlockReason) -> usize {
        let mut state = self.state.lock();
        state
            .operations
            .values_mut()
            .map(|op| op.unblock_if(reason))
            .filter(|unblocked| *unblocked)
            .count()
    }

    /// Re-enables `op` if it is blocked for `reason`.
    pub(crate) fn unblock_operation(&self, op: OperationId, reason: BlockReason) -> bool {
        self.state
            .lock()
            .operations
            .get_mut(&op)
            .is_some_and(|op| op.unblock_if(reason))
    }

    /// Returns true if `op` has completed.
    pub(crate) fn is_completed(&self, op: OperationId) -> bool {
        self.state.lock().completed.contains(&op)
    }

    /// Returns true once the run has ended.
    pub(crate) fn is_terminated(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    // ------------------------------------------------------------------
    // Nondeterministic values
    // ------------------------------------------------------------------

    /// Asks the strategy for a boolean and records it.
    pub(crate) fn next_boolean(&self, current: OperationId, fair_site: Option<u64>) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            drop(state);
            cancel_current()
        }
        let SchedulerState {
            strategy, trace, ..
        } = &mut *state;
        let result = match strategy.as_mut() {
            Some(strategy) => strategy.next_boolean(fair_site, trace),
            None => Err(Error::internal("no exploration strategy installed")),
        };
        match result {
            Ok(value) => {
                state.trace.push(Choice::Boolean(value));
                tracing::debug!(operation = %current, value, fair = fair_site.is_some(), "boolean choice");
                value
            }
            Err(err) => {
                self.terminate_with_bug(&mut state, Some(current), err, None);
                drop(state);
                cancel_current()
            }
        }
    }

    /// Asks the strategy for an integer in `0..bound` and records it.
    pub(crate) fn next_integer(&self, current: OperationId, bound: u64) -> u64 {
        if bound == 0 {
            self.fail(
                Some(current),
                Error::configuration("random integer bound must be non-zero"),
            );
        }
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            drop(state);
            cancel_current()
        }
        let SchedulerState {
            strategy, trace, ..
        } = &mut *state;
        let result = match strategy.as_mut() {
            Some(strategy) => strategy.next_integer(bound, trace),
            None => Err(Error::internal("no exploration strategy installed")),
        };
        match result {
            Ok(value) if value < bound => {
                state.trace.push(Choice::Integer(value));
                tracing::debug!(operation = %current, value, bound, "integer choice");
                value
            }
            Ok(value) => {
                let err = Error::internal(format!("strategy chose {value} outside 0..{bound}"));
                self.terminate_with_bug(&mut state, Some(current), err, None);
                drop(state);
                cancel_current()
            }
            Err(err) => {
                self.terminate_with_bug(&mut state, Some(current), err, None);
                drop(state);
                cancel_current()
            }
        }
    }

    // ------------------------------------------------------------------
    // Verdicts
    // ------------------------------------------------------------------

    /// Reports a bug, ends the run, and unwinds the caller.
    pub(crate) fn fail(&self, current: Option<OperationId>, error: Error) -> ! {
        {
            let mut state = self.state.lock();
            self.terminate_with_bug(&mut state, current, error, None);
        }
        cancel_current()
    }

    /// Ends a run that could not start. Never unwinds.
    pub(crate) fn abort(&self, error: Error) {
        let mut state = self.state.lock();
        self.terminate_with_bug(&mut state, None, error, None);
    }

    fn record_panic(&self, id: OperationId, payload: &(dyn Any + Send)) {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let mut state = self.state.lock();
        let err = Error::assertion(format!("{id} panicked: {detail}"));
        self.terminate_with_bug(&mut state, Some(id), err, None);
    }

    fn terminate_with_bug(
        &self,
        state: &mut SchedulerState,
        current: Option<OperationId>,
        error: Error,
        cycle: Option<Range<usize>>,
    ) {
        let mut error = error;
        if error.context().choice_point.is_none() {
            error = error.at_choice_point(state.trace.len());
        }
        if let (Some(op), None) = (current, error.context().operation) {
            error = error.at_operation(op);
        }
        self.terminate(state, RunOutcome::Bug { error, cycle });
    }

    fn terminate(&self, state: &mut SchedulerState, outcome: RunOutcome) {
        if state.outcome.is_some() {
            return;
        }
        match &outcome {
            RunOutcome::Bug { error, .. } => {
                tracing::info!(kind = ?error.kind(), error = %error, steps = state.steps, "run ended with a bug");
            }
            RunOutcome::StepBoundReached => {
                tracing::debug!(steps = state.steps, "run cut at step bound");
            }
            RunOutcome::Completed => {
                tracing::debug!(steps = state.steps, "run completed");
            }
        }
        state.outcome = Some(outcome);
        state.active = None;
        for op in state.operations.values() {
            op.parker.notify_all();
        }
        self.done.notify_all();
    }
}
