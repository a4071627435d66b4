//! Pluggable exploration strategies.
//!
//! The scheduler owns exactly one [`ExplorationStrategy`] for the duration of
//! a run and consults it at every choice point. Between runs the test engine
//! calls [`ExplorationStrategy::prepare_next_iteration`] so the strategy can
//! backtrack, reseed, or report that nothing is left to explore.
//!
//! | Strategy | Between runs | Fair booleans |
//! |----------|--------------|---------------|
//! | [`DfsStrategy`] | backtrack to the deepest untried alternative | alternate per call site |
//! | [`RandomStrategy`] | reseed from `(seed, iteration)` | random |
//! | [`PriorityStrategy`] | reshuffle priorities and change points | alternate per call site |
//! | [`ReplayStrategy`] | single run only | recorded |

pub mod dfs;
pub mod priority;
pub mod random;
pub mod replay;

pub use dfs::DfsStrategy;
pub use priority::PriorityStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;

use crate::error::Result;
use crate::trace::ScheduleTrace;
use crate::types::OperationId;
use crate::util::DetHashMap;

/// Decision procedure for choosing operations and nondeterministic values.
///
/// `enabled` is always non-empty and sorted by operation id. `current` is the
/// operation that reached the scheduling point; it may or may not be enabled
/// (it is not when it just blocked or completed).
pub trait ExplorationStrategy: Send {
    /// Human-readable name used in reports and logs.
    fn name(&self) -> &'static str;

    /// Prepares for run number `iteration` (starting at 0).
    ///
    /// Returns `false` when the strategy has nothing left to explore.
    fn prepare_next_iteration(&mut self, iteration: u64) -> bool;

    /// Chooses the operation to release.
    ///
    /// `is_yielding` asks the strategy to deprioritize `current` for this one
    /// decision.
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
        trace: &ScheduleTrace,
    ) -> Result<OperationId>;

    /// Chooses a boolean.
    ///
    /// `fair_site` identifies the call site of a fair choice; a strategy must
    /// not let any fair site starve one of its values within a run.
    fn next_boolean(&mut self, fair_site: Option<u64>, trace: &ScheduleTrace) -> Result<bool>;

    /// Chooses an integer in `0..bound`. `bound` is never zero.
    fn next_integer(&mut self, bound: u64, trace: &ScheduleTrace) -> Result<u64>;

    /// Returns true once the strategy has explored everything it can.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Per-run bookkeeping for fair booleans: each call site alternates
/// `false`, `true`, `false`, ...
#[derive(Debug, Clone, Default)]
pub(crate) struct FairAlternation {
    counts: DetHashMap<u64, u64>,
}

impl FairAlternation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next(&mut self, site: u64) -> bool {
        let count = self.counts.entry(site).or_insert(0);
        let value = *count % 2 == 1;
        *count += 1;
        value
    }

    pub(crate) fn reset(&mut self) {
        self.counts.clear();
    }
}

/// Orders `enabled` for exploration: the caller first unless it yields, in
/// which case it goes last.
pub(crate) fn exploration_order(
    enabled: &[OperationId],
    current: OperationId,
    is_yielding: bool,
) -> Vec<OperationId> {
    let mut order: Vec<OperationId> = enabled.iter().copied().filter(|op| *op != current).collect();
    if enabled.contains(&current) {
        if is_yielding {
            order.push(current);
        } else {
            order.insert(0, current);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(ids: &[u64]) -> Vec<OperationId> {
        ids.iter().copied().map(OperationId::new).collect()
    }

    #[test]
    fn fair_alternation_is_per_site() {
        let mut fair = FairAlternation::default();
        assert!(!fair.next(1));
        assert!(!fair.next(2));
        assert!(fair.next(1));
        assert!(!fair.next(1));
        assert!(fair.next(2));
        fair.reset();
        assert!(!fair.next(1));
    }

    #[test]
    fn caller_goes_first_unless_yielding() {
        let enabled = ops(&[0, 1, 2]);
        assert_eq!(
            exploration_order(&enabled, OperationId::new(1), false),
            ops(&[1, 0, 2])
        );
        assert_eq!(
            exploration_order(&enabled, OperationId::new(1), true),
            ops(&[0, 2, 1])
        );
        assert_eq!(
            exploration_order(&enabled, OperationId::new(7), false),
            ops(&[0, 1, 2])
        );
    }
}
