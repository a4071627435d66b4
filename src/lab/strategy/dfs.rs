//! Exhaustive depth-first exploration.
//!
//! Every choice point becomes a node holding all of its alternatives. A run
//! first replays the recorded prefix of nodes, then extends the path with the
//! first alternative of each new choice point. Between runs the deepest node
//! with an untried alternative is advanced and everything below it dropped.
//! Exploration ends when no node has alternatives left.

use super::{exploration_order, ExplorationStrategy, FairAlternation};
use crate::error::{Error, Result};
use crate::trace::{Choice, ScheduleTrace};
use crate::types::OperationId;

/// The values a choice point can take. Integer ranges are never listed.
#[derive(Debug, Clone)]
enum Alternatives {
    Listed(Vec<Choice>),
    Integers(u64),
}

impl Alternatives {
    fn len(&self) -> u64 {
        match self {
            Self::Listed(choices) => choices.len() as u64,
            Self::Integers(bound) => *bound,
        }
    }

    fn get(&self, index: u64) -> Option<Choice> {
        match self {
            Self::Listed(choices) => usize::try_from(index)
                .ok()
                .and_then(|i| choices.get(i))
                .copied(),
            Self::Integers(bound) => (index < *bound).then_some(Choice::Integer(index)),
        }
    }

    fn contains(&self, choice: &Choice) -> bool {
        match (self, choice) {
            (Self::Listed(choices), _) => choices.contains(choice),
            (Self::Integers(bound), Choice::Integer(value)) => value < bound,
            (Self::Integers(_), _) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    alternatives: Alternatives,
    chosen: Choice,
    index: u64,
}

impl Node {
    /// Moves to the next untried alternative, if any.
    fn advance(&mut self) -> bool {
        if self.index + 1 >= self.alternatives.len() {
            return false;
        }
        match self.alternatives.get(self.index + 1) {
            Some(next) => {
                self.index += 1;
                self.chosen = next;
                true
            }
            None => false,
        }
    }
}

/// Depth-first strategy over operation, boolean, and integer choices.
///
/// Fair booleans do not branch; they alternate per call site so that a loop
/// guarded by one cannot starve either branch within a run.
#[derive(Debug, Default)]
pub struct DfsStrategy {
    stack: Vec<Node>,
    position: usize,
    fair: FairAlternation,
    exhausted: bool,
}

impl DfsStrategy {
    /// Creates a strategy with an empty exploration tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth of the current exploration path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn choose(&mut self, alternatives: Alternatives) -> Result<Choice> {
        if let Some(node) = self.stack.get(self.position) {
            let recorded = node.chosen;
            if !alternatives.contains(&recorded) {
                return Err(Error::non_reproducible(format!(
                    "depth-first prefix diverged at depth {}: recorded {} {recorded} is not available",
                    self.position,
                    recorded.label(),
                )));
            }
            self.position += 1;
            return Ok(recorded);
        }

        let Some(first) = alternatives.get(0) else {
            return Err(Error::internal(format!(
                "choice point at depth {} has no alternatives",
                self.position
            )));
        };
        self.stack.push(Node {
            alternatives,
            chosen: first,
            index: 0,
        });
        self.position += 1;
        Ok(first)
    }

    fn backtrack(&mut self) -> bool {
        self.stack.truncate(self.position);
        while let Some(node) = self.stack.last_mut() {
            if node.advance() {
                let next = node.chosen;
                tracing::trace!(depth = self.stack.len(), next = %next, "dfs backtracked");
                return true;
            }
            self.stack.pop();
        }
        false
    }
}

impl ExplorationStrategy for DfsStrategy {
    fn name(&self) -> &'static str {
        "dfs"
    }

    fn prepare_next_iteration(&mut self, iteration: u64) -> bool {
        if iteration == 0 {
            self.stack.clear();
            self.exhausted = false;
        } else if !self.backtrack() {
            self.exhausted = true;
            return false;
        }
        self.position = 0;
        self.fair.reset();
        true
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
        _trace: &ScheduleTrace,
    ) -> Result<OperationId> {
        let alternatives = exploration_order(enabled, current, is_yielding)
            .into_iter()
            .map(Choice::Operation)
            .collect();
        match self.choose(Alternatives::Listed(alternatives))? {
            Choice::Operation(op) => Ok(op),
            other => Err(Error::internal(format!(
                "dfs node holds {} choice where an operation was expected",
                other.label()
            ))),
        }
    }

    fn next_boolean(&mut self, fair_site: Option<u64>, _trace: &ScheduleTrace) -> Result<bool> {
        if let Some(site) = fair_site {
            return Ok(self.fair.next(site));
        }
        match self.choose(Alternatives::Listed(vec![
            Choice::Boolean(false),
            Choice::Boolean(true),
        ]))? {
            Choice::Boolean(value) => Ok(value),
            other => Err(Error::non_reproducible(format!(
                "depth-first prefix expected a boolean, recorded {}",
                other.label()
            ))),
        }
    }

    fn next_integer(&mut self, bound: u64, _trace: &ScheduleTrace) -> Result<u64> {
        match self.choose(Alternatives::Integers(bound))? {
            Choice::Integer(value) => Ok(value),
            other => Err(Error::non_reproducible(format!(
                "depth-first prefix expected an integer, recorded {}",
                other.label()
            ))),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ops(ids: &[u64]) -> Vec<OperationId> {
        ids.iter().copied().map(OperationId::new).collect()
    }

    /// Drives two binary choice points per run and collects the paths.
    fn explore_two_level() -> Vec<(OperationId, bool)> {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        let mut paths = Vec::new();
        let mut iteration = 0;
        while dfs.prepare_next_iteration(iteration) {
            let op = dfs
                .next_operation(&ops(&[0, 1]), OperationId::ROOT, false, &trace)
                .expect("op");
            let b = dfs.next_boolean(None, &trace).expect("bool");
            paths.push((op, b));
            iteration += 1;
        }
        paths
    }

    #[test]
    fn explores_every_path_once() {
        let paths = explore_two_level();
        assert_eq!(
            paths,
            vec![
                (OperationId::new(0), false),
                (OperationId::new(0), true),
                (OperationId::new(1), false),
                (OperationId::new(1), true),
            ]
        );
    }

    #[test]
    fn reports_exhaustion() {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        assert!(dfs.prepare_next_iteration(0));
        dfs.next_operation(&ops(&[3]), OperationId::new(3), false, &trace)
            .expect("op");
        assert!(!dfs.prepare_next_iteration(1));
        assert!(dfs.is_exhausted());
    }

    #[test]
    fn yielding_caller_is_tried_last() {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        assert!(dfs.prepare_next_iteration(0));
        let first = dfs
            .next_operation(&ops(&[0, 1]), OperationId::ROOT, true, &trace)
            .expect("op");
        assert_eq!(first, OperationId::new(1));
    }

    #[test]
    fn fair_booleans_alternate_without_branching() {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        assert!(dfs.prepare_next_iteration(0));
        let values: Vec<bool> = (0..4)
            .map(|_| dfs.next_boolean(Some(7), &trace).expect("bool"))
            .collect();
        assert_eq!(values, vec![false, true, false, true]);
        assert_eq!(dfs.depth(), 0);
        assert!(!dfs.prepare_next_iteration(1));
    }

    #[test]
    fn divergent_prefix_is_non_reproducible() {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        assert!(dfs.prepare_next_iteration(0));
        dfs.next_operation(&ops(&[0, 1]), OperationId::ROOT, false, &trace)
            .expect("op");
        dfs.next_operation(&ops(&[0, 1]), OperationId::ROOT, false, &trace)
            .expect("op");
        assert!(dfs.prepare_next_iteration(1));
        // Operation 0 vanished from the first choice point.
        let err = dfs
            .next_operation(&ops(&[1]), OperationId::new(1), false, &trace)
            .expect_err("must diverge");
        assert_eq!(err.kind(), ErrorKind::NonReproducibleReplay);
    }

    #[test]
    fn integers_branch_over_bound() {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        let mut seen = Vec::new();
        let mut iteration = 0;
        while dfs.prepare_next_iteration(iteration) {
            seen.push(dfs.next_integer(3, &trace).expect("int"));
            iteration += 1;
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn huge_integer_bound_is_not_enumerated() {
        let trace = ScheduleTrace::new();
        let mut dfs = DfsStrategy::new();
        assert!(dfs.prepare_next_iteration(0));
        assert_eq!(dfs.next_integer(u64::MAX, &trace).expect("int"), 0);
        assert!(dfs.prepare_next_iteration(1));
        assert_eq!(dfs.next_integer(u64::MAX, &trace).expect("int"), 1);
        assert!(dfs.prepare_next_iteration(2));
        assert_eq!(dfs.next_integer(u64::MAX, &trace).expect("int"), 2);
        assert_eq!(dfs.depth(), 1);
    }
}
