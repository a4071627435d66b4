//! Priority-based exploration (probabilistic concurrency testing).
//!
//! Every operation receives a random priority the first time it is seen and
//! the highest-priority enabled operation always runs. At a few randomly
//! chosen steps per run the running operation's priority drops to the lowest,
//! which forces the preemptions that shallow-depth bugs need.

use std::collections::BTreeSet;

use super::{ExplorationStrategy, FairAlternation};
use crate::error::Result;
use crate::trace::ScheduleTrace;
use crate::types::OperationId;
use crate::util::DetRng;

/// PCT-style strategy with a fixed number of priority change points.
#[derive(Debug, Clone)]
pub struct PriorityStrategy {
    seed: u64,
    rng: DetRng,
    change_point_count: u32,
    max_steps: u64,
    /// Highest priority first.
    priorities: Vec<OperationId>,
    change_points: BTreeSet<u64>,
    step: u64,
    fair: FairAlternation,
}

impl PriorityStrategy {
    /// Creates a strategy with `change_points` priority drops per run, spread
    /// over a run of at most `max_steps` scheduling steps.
    #[must_use]
    pub fn new(seed: u64, change_points: u32, max_steps: u64) -> Self {
        Self {
            seed,
            rng: DetRng::new(seed),
            change_point_count: change_points,
            max_steps,
            priorities: Vec::new(),
            change_points: BTreeSet::new(),
            step: 0,
            fair: FairAlternation::new(),
        }
    }

    fn rank(&self, op: OperationId) -> usize {
        self.priorities
            .iter()
            .position(|p| *p == op)
            .unwrap_or(usize::MAX)
    }

    fn admit_new(&mut self, enabled: &[OperationId]) {
        for op in enabled {
            if !self.priorities.contains(op) {
                let slot = self.rng.next_index(self.priorities.len() + 1);
                self.priorities.insert(slot, *op);
            }
        }
    }
}

impl ExplorationStrategy for PriorityStrategy {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn prepare_next_iteration(&mut self, iteration: u64) -> bool {
        self.rng = DetRng::for_iteration(self.seed, iteration);
        self.priorities.clear();
        self.change_points.clear();
        self.step = 0;
        self.fair.reset();
        if self.max_steps > 1 {
            let wanted = u64::from(self.change_point_count).min(self.max_steps - 1);
            while (self.change_points.len() as u64) < wanted {
                self.change_points
                    .insert(1 + self.rng.next_below(self.max_steps - 1));
            }
        }
        true
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
        _trace: &ScheduleTrace,
    ) -> Result<OperationId> {
        self.admit_new(enabled);
        self.step += 1;

        if self.change_points.contains(&self.step) {
            if let Some(top) = enabled.iter().copied().min_by_key(|op| self.rank(*op)) {
                self.priorities.retain(|p| *p != top);
                self.priorities.push(top);
                tracing::trace!(step = self.step, lowered = %top, "priority change point");
            }
        }

        let skip_current = is_yielding && enabled.len() > 1;
        let chosen = enabled
            .iter()
            .copied()
            .filter(|op| !(skip_current && *op == current))
            .min_by_key(|op| self.rank(*op))
            .unwrap_or(enabled[0]);
        Ok(chosen)
    }

    fn next_boolean(&mut self, fair_site: Option<u64>, _trace: &ScheduleTrace) -> Result<bool> {
        Ok(match fair_site {
            Some(site) => self.fair.next(site),
            None => self.rng.next_bool(),
        })
    }

    fn next_integer(&mut self, bound: u64, _trace: &ScheduleTrace) -> Result<u64> {
        Ok(self.rng.next_below(bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(ids: &[u64]) -> Vec<OperationId> {
        ids.iter().copied().map(OperationId::new).collect()
    }

    #[test]
    fn highest_priority_runs_until_change_point() {
        let trace = ScheduleTrace::new();
        let mut strategy = PriorityStrategy::new(7, 0, 100);
        assert!(strategy.prepare_next_iteration(0));
        let first = strategy
            .next_operation(&ops(&[0, 1, 2]), OperationId::ROOT, false, &trace)
            .expect("op");
        for _ in 0..20 {
            let next = strategy
                .next_operation(&ops(&[0, 1, 2]), OperationId::ROOT, false, &trace)
                .expect("op");
            assert_eq!(next, first);
        }
    }

    #[test]
    fn change_points_are_within_run() {
        let mut strategy = PriorityStrategy::new(3, 5, 50);
        assert!(strategy.prepare_next_iteration(2));
        assert_eq!(strategy.change_points.len(), 5);
        assert!(strategy.change_points.iter().all(|p| (1..50).contains(p)));
    }

    #[test]
    fn fair_booleans_alternate() {
        let trace = ScheduleTrace::new();
        let mut strategy = PriorityStrategy::new(1, 2, 10);
        assert!(strategy.prepare_next_iteration(0));
        let values: Vec<bool> = (0..4)
            .map(|_| strategy.next_boolean(Some(42), &trace).expect("bool"))
            .collect();
        assert_eq!(values, vec![false, true, false, true]);
    }
}
