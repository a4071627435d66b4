//! Results of a systematic test.

use core::fmt;
use core::ops::Range;
use std::path::Path;

use crate::error::{Error, ErrorKind};
use crate::trace::{save_trace, ScheduleTrace, TraceFileError};

/// One bug found during exploration.
#[derive(Debug, Clone)]
pub struct BugReport {
    /// Iteration that found the bug.
    pub iteration: u64,
    /// The verdict.
    pub error: Error,
    /// The schedule that reproduces it.
    pub trace: ScheduleTrace,
    /// For liveness bugs found by cycle detection, the repeating segment
    /// of `trace`.
    pub cycle: Option<Range<usize>>,
}

impl BugReport {
    /// The verdict's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// The verdict's message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.error.message().unwrap_or_default()
    }

    /// Persists the reproducing trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_trace(&self, path: impl AsRef<Path>) -> Result<(), TraceFileError> {
        save_trace(path, &self.trace)
    }
}

impl fmt::Display for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration {}: {} ({} decisions)",
            self.iteration,
            self.error,
            self.trace.len()
        )
    }
}

/// Summary of a systematic test.
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    /// Name of the strategy that explored.
    pub strategy: &'static str,
    /// Schedules executed.
    pub iterations: u64,
    /// Scheduling steps over all schedules.
    pub total_steps: u64,
    /// Schedules cut short by the step bound.
    pub step_bound_hits: u64,
    /// Longest trace seen.
    pub max_depth: usize,
    /// True if the strategy ran out of schedules.
    pub exhausted: bool,
    /// Bugs found, in discovery order.
    pub bugs: Vec<BugReport>,
}

impl TestReport {
    pub(crate) fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Returns true if no bug was found.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.bugs.is_empty()
    }

    /// The first bug found, if any.
    #[must_use]
    pub fn first_bug(&self) -> Option<&BugReport> {
        self.bugs.first()
    }

    /// Messages of every bug, in discovery order.
    #[must_use]
    pub fn bug_messages(&self) -> Vec<&str> {
        self.bugs.iter().map(BugReport::message).collect()
    }

    pub(crate) fn record_run(&mut self, steps: u64, trace_len: usize) {
        self.iterations += 1;
        self.total_steps += steps;
        self.max_depth = self.max_depth.max(trace_len);
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} iteration(s), {} step(s), {} bug(s)",
            self.strategy,
            self.iterations,
            self.total_steps,
            self.bugs.len()
        )?;
        if self.exhausted {
            write!(f, ", search space exhausted")?;
        }
        for bug in &self.bugs {
            write!(f, "\n  {bug}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Choice;
    use crate::types::OperationId;

    #[test]
    fn success_and_first_bug() {
        let mut report = TestReport::new("dfs");
        report.record_run(4, 3);
        assert!(report.is_success());
        let mut trace = ScheduleTrace::new();
        trace.push(Choice::Operation(OperationId::ROOT));
        report.bugs.push(BugReport {
            iteration: 0,
            error: Error::assertion("Error reached."),
            trace,
            cycle: None,
        });
        assert!(!report.is_success());
        assert_eq!(report.first_bug().map(BugReport::message), Some("Error reached."));
        assert_eq!(report.max_depth, 3);
        let text = report.to_string();
        assert!(text.contains("1 bug(s)"), "{text}");
    }
}
