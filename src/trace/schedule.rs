//! The schedule trace: the ordered record of every decision in one run.
//!
//! Each scheduling point or nondeterministic choice appends one [`Decision`].
//! The trace is a total order over the run, so feeding it back through the
//! replay strategy reproduces the run exactly.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::OperationId;

/// The value chosen at a choice point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// The operation released at a scheduling point.
    Operation(OperationId),
    /// A nondeterministic boolean.
    Boolean(bool),
    /// A nondeterministic integer in `0..bound`.
    Integer(u64),
}

impl Choice {
    /// Returns the operation, if this is a scheduling choice.
    #[must_use]
    pub const fn as_operation(&self) -> Option<OperationId> {
        match self {
            Self::Operation(op) => Some(*op),
            _ => None,
        }
    }

    /// Short label used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Operation(_) => "operation",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(op) => write!(f, "{op}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
        }
    }
}

/// One recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    /// Position of the choice point within the run.
    pub choice_point: u64,
    /// What was chosen.
    pub choice: Choice,
}

/// Ordered sequence of decisions for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    decisions: Vec<Decision>,
}

impl ScheduleTrace {
    /// Creates an empty trace.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            decisions: Vec::new(),
        }
    }

    /// Builds a trace from raw decisions.
    #[must_use]
    pub fn from_decisions(decisions: Vec<Decision>) -> Self {
        Self { decisions }
    }

    /// Appends a choice and returns its choice point.
    pub fn push(&mut self, choice: Choice) -> u64 {
        let choice_point = self.decisions.len() as u64;
        self.decisions.push(Decision {
            choice_point,
            choice,
        });
        choice_point
    }

    /// Number of recorded decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Returns the decision at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Decision> {
        self.decisions.get(index)
    }

    /// All decisions in order.
    #[must_use]
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Iterates over the decisions.
    pub fn iter(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter()
    }

    /// The sequence of scheduled operations, skipping value choices.
    #[must_use]
    pub fn operation_choices(&self) -> Vec<OperationId> {
        self.decisions
            .iter()
            .filter_map(|d| d.choice.as_operation())
            .collect()
    }

    /// Consumes the trace, returning its decisions.
    #[must_use]
    pub fn into_decisions(self) -> Vec<Decision> {
        self.decisions
    }
}

impl<'a> IntoIterator for &'a ScheduleTrace {
    type Item = &'a Decision;
    type IntoIter = core::slice::Iter<'a, Decision>;

    fn into_iter(self) -> Self::IntoIter {
        self.decisions.iter()
    }
}
