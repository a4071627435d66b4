//! Replay of a recorded schedule trace.

use super::ExplorationStrategy;
use crate::error::{Error, Result};
use crate::trace::{Choice, ScheduleTrace};
use crate::types::OperationId;

/// Returns exactly the recorded decision at every choice point.
///
/// Only one iteration is ever run. A recorded operation that is not enabled,
/// a value of the wrong shape, or a program that asks for more decisions than
/// were recorded all fail with [`ErrorKind::NonReproducibleReplay`].
///
/// [`ErrorKind::NonReproducibleReplay`]: crate::error::ErrorKind::NonReproducibleReplay
#[derive(Debug, Clone)]
pub struct ReplayStrategy {
    recorded: ScheduleTrace,
    cursor: usize,
}

impl ReplayStrategy {
    /// Creates a strategy replaying `trace`.
    #[must_use]
    pub const fn new(trace: ScheduleTrace) -> Self {
        Self {
            recorded: trace,
            cursor: 0,
        }
    }

    /// Number of decisions consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    fn next_recorded(&mut self, wanted: &'static str) -> Result<Choice> {
        let Some(decision) = self.recorded.get(self.cursor) else {
            return Err(Error::non_reproducible(format!(
                "trace ended after {} decisions but the program requested another {wanted}",
                self.recorded.len()
            ))
            .at_choice_point(self.cursor));
        };
        self.cursor += 1;
        Ok(decision.choice)
    }

    fn mismatch(&self, wanted: &'static str, found: Choice) -> Error {
        Error::non_reproducible(format!(
            "expected {wanted} at choice point {}, trace recorded {} {found}",
            self.cursor - 1,
            found.label()
        ))
        .at_choice_point(self.cursor - 1)
    }
}

impl ExplorationStrategy for ReplayStrategy {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn prepare_next_iteration(&mut self, iteration: u64) -> bool {
        self.cursor = 0;
        iteration == 0
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _current: OperationId,
        _is_yielding: bool,
        _trace: &ScheduleTrace,
    ) -> Result<OperationId> {
        match self.next_recorded("operation")? {
            Choice::Operation(op) if enabled.contains(&op) => Ok(op),
            Choice::Operation(op) => Err(Error::non_reproducible(format!(
                "recorded {op} at choice point {} is not enabled (enabled: {enabled:?})",
                self.cursor - 1
            ))
            .at_choice_point(self.cursor - 1)),
            other => Err(self.mismatch("operation", other)),
        }
    }

    fn next_boolean(&mut self, _fair_site: Option<u64>, _trace: &ScheduleTrace) -> Result<bool> {
        match self.next_recorded("boolean")? {
            Choice::Boolean(value) => Ok(value),
            other => Err(self.mismatch("boolean", other)),
        }
    }

    fn next_integer(&mut self, bound: u64, _trace: &ScheduleTrace) -> Result<u64> {
        match self.next_recorded("integer")? {
            Choice::Integer(value) if value < bound => Ok(value),
            other => Err(self.mismatch("integer", other)),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.recorded.len()
    }
}
