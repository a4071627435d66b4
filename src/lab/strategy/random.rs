//! Randomized exploration.
//!
//! Each run is an independent sample driven by a [`DetRng`] seeded from
//! `(seed, iteration)`, so run `n` of a test always makes the same choices.

use super::ExplorationStrategy;
use crate::error::Result;
use crate::trace::ScheduleTrace;
use crate::types::OperationId;
use crate::util::DetRng;

/// Uniform random choices with an optional penalty on repeats.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    seed: u64,
    rng: DetRng,
    repeat_penalty: bool,
    last: Option<OperationId>,
}

impl RandomStrategy {
    /// Creates a strategy for `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: DetRng::new(seed),
            repeat_penalty: false,
            last: None,
        }
    }

    /// When enabled, picking the same operation twice in a row takes two
    /// consecutive hits instead of one.
    #[must_use]
    pub const fn with_repeat_penalty(mut self, enabled: bool) -> Self {
        self.repeat_penalty = enabled;
        self
    }
}

impl ExplorationStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn prepare_next_iteration(&mut self, iteration: u64) -> bool {
        self.rng = DetRng::for_iteration(self.seed, iteration);
        self.last = None;
        true
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
        _trace: &ScheduleTrace,
    ) -> Result<OperationId> {
        let candidates: Vec<OperationId> = if is_yielding && enabled.len() > 1 {
            enabled.iter().copied().filter(|op| *op != current).collect()
        } else {
            enabled.to_vec()
        };

        let mut chosen = candidates[self.rng.next_index(candidates.len())];
        if self.repeat_penalty && candidates.len() > 1 && Some(chosen) == self.last {
            chosen = candidates[self.rng.next_index(candidates.len())];
        }
        self.last = Some(chosen);
        Ok(chosen)
    }

    fn next_boolean(&mut self, _fair_site: Option<u64>, _trace: &ScheduleTrace) -> Result<bool> {
        Ok(self.rng.next_bool())
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

    fn sample_run(strategy: &mut RandomStrategy, iteration: u64) -> Vec<OperationId> {
        let trace = ScheduleTrace::new();
        assert!(strategy.prepare_next_iteration(iteration));
        (0..32)
            .map(|_| {
                strategy
                    .next_operation(&ops(&[0, 1, 2]), OperationId::ROOT, false, &trace)
                    .expect("op")
            })
            .collect()
    }

    #[test]
    fn same_iteration_same_choices() {
        let mut a = RandomStrategy::new(99);
        let mut b = RandomStrategy::new(99);
        assert_eq!(sample_run(&mut a, 3), sample_run(&mut b, 3));
    }

    #[test]
    fn iterations_differ() {
        let mut a = RandomStrategy::new(99);
        let first = sample_run(&mut a, 0);
        let second = sample_run(&mut a, 1);
        assert_ne!(first, second);
    }

    #[test]
    fn yielding_caller_is_skipped_when_possible() {
        let trace = ScheduleTrace::new();
        let mut strategy = RandomStrategy::new(5);
        assert!(strategy.prepare_next_iteration(0));
        for _ in 0..64 {
            let op = strategy
                .next_operation(&ops(&[0, 1]), OperationId::ROOT, true, &trace)
                .expect("op");
            assert_eq!(op, OperationId::new(1));
        }
        let only = strategy
            .next_operation(&ops(&[0]), OperationId::ROOT, true, &trace)
            .expect("op");
        assert_eq!(only, OperationId::ROOT);
    }

    #[test]
    fn integers_stay_in_bound() {
        let trace = ScheduleTrace::new();
        let mut strategy = RandomStrategy::new(11);
        assert!(strategy.prepare_next_iteration(0));
        for _ in 0..100 {
            assert!(strategy.next_integer(4, &trace).expect("int") < 4);
        }
    }
}
