//! Liveness checking over the sequence of scheduling steps.
//!
//! At every scheduling decision the scheduler hands the checker a fingerprint
//! of the global state together with the monitors that are currently hot.
//! When a fingerprint recurs, the steps since its previous occurrence form a
//! cycle the program can repeat forever. The cycle is a liveness violation
//! when
//!
//! 1. one monitor was hot at every step of it,
//! 2. that monitor's current hot streak has lasted at least the temperature
//!    threshold (`0` accepts any repetition), and
//! 3. the cycle is fairly scheduled: every operation enabled throughout the
//!    cycle was scheduled at least once inside it.
//!
//! A cycle in which every monitor is cold at some step is progress and is
//! ignored, even if some other monitor was hot at that step.
//!
//! With cycle detection disabled, a positive threshold still bounds how many
//! consecutive steps a monitor may stay hot.

use core::fmt;
use core::ops::Range;

use smallvec::SmallVec;

use crate::error::Error;
use crate::types::OperationId;
use crate::util::DetHashMap;

/// A monitor that is in a hot state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HotMonitor {
    /// Monitor name.
    pub monitor: &'static str,
    /// Name of its current (hot) state.
    pub state: String,
}

impl fmt::Display for HotMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.monitor, self.state)
    }
}

/// Snapshot of the state the scheduler cannot see by itself.
#[derive(Debug, Clone, Default)]
pub(crate) struct Observation {
    pub(crate) fingerprint: u64,
    pub(crate) hot: Vec<HotMonitor>,
}

/// Source of observations: the actor and monitor registries of a run.
pub(crate) trait StateObserver: Send + Sync {
    fn observe(&self) -> Observation;
}

/// Liveness options for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LivenessSettings {
    /// Detect repeated global states.
    pub cycle_detection: bool,
    /// Minimum number of consecutive hot steps before a verdict.
    pub temperature_threshold: u64,
}

impl LivenessSettings {
    /// Returns true when any per-step checking is needed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.cycle_detection || self.temperature_threshold > 0
    }
}

/// A liveness verdict with the offending segment of the schedule trace.
#[derive(Debug, Clone)]
pub(crate) struct LivenessVerdict {
    pub(crate) error: Error,
    pub(crate) cycle: Option<Range<usize>>,
}

#[derive(Debug, Clone)]
struct Step {
    hot: SmallVec<[&'static str; 2]>,
    scheduled: OperationId,
    enabled: SmallVec<[OperationId; 8]>,
    trace_index: usize,
}

/// Per-run liveness state.
#[derive(Debug)]
pub(crate) struct LivenessChecker {
    settings: LivenessSettings,
    history: Vec<Step>,
    last_seen: DetHashMap<u64, usize>,
    /// Consecutive hot steps per monitor; a cold monitor has no entry.
    hot_streaks: DetHashMap<&'static str, u64>,
}

impl LivenessChecker {
    pub(crate) fn new(settings: LivenessSettings) -> Self {
        Self {
            settings,
            history: Vec::new(),
            last_seen: DetHashMap::default(),
            hot_streaks: DetHashMap::default(),
        }
    }

    /// Records one scheduling step and returns a verdict if it closes a
    /// violating cycle or exceeds the temperature threshold.
    pub(crate) fn record(
        &mut self,
        fingerprint: u64,
        hot: &[HotMonitor],
        scheduled: OperationId,
        enabled: &[OperationId],
        trace_index: usize,
    ) -> Option<LivenessVerdict> {
        self.hot_streaks
            .retain(|name, _| hot.iter().any(|m| m.monitor == *name));
        for monitor in hot {
            *self.hot_streaks.entry(monitor.monitor).or_insert(0) += 1;
        }

        let index = self.history.len();
        self.history.push(Step {
            hot: hot.iter().map(|m| m.monitor).collect(),
            scheduled,
            enabled: enabled.iter().copied().collect(),
            trace_index,
        });

        if self.settings.cycle_detection {
            let previous = self.last_seen.insert(fingerprint, index);
            if let Some(start) = previous {
                if let Some(verdict) = self.check_cycle(start, index, hot) {
                    return Some(verdict);
                }
            }
        } else if self.settings.temperature_threshold > 0 {
            let (monitor, streak) = hot.iter().find_map(|m| {
                let streak = self.streak(m.monitor);
                (streak > self.settings.temperature_threshold).then_some((m, streak))
            })?;
            return Some(LivenessVerdict {
                error: Error::liveness(format!(
                    "Monitor '{}' detected potential liveness bug in hot state '{}' \
                     (hot for {streak} consecutive steps).",
                    monitor.monitor, monitor.state
                )),
                cycle: None,
            });
        }
        None
    }

    fn check_cycle(
        &self,
        start: usize,
        end: usize,
        hot: &[HotMonitor],
    ) -> Option<LivenessVerdict> {
        let cycle = &self.history[start..end];
        let always_hot: Vec<&HotMonitor> = hot
            .iter()
            .filter(|m| cycle.iter().all(|step| step.hot.contains(&m.monitor)))
            .collect();
        if always_hot.is_empty() {
            tracing::debug!(
                start = cycle.first().map_or(0, |s| s.trace_index),
                length = cycle.len(),
                "no monitor stays hot across the cycle"
            );
            return None;
        }
        let threshold = self.settings.temperature_threshold;
        let monitor = always_hot
            .into_iter()
            .find(|m| self.streak(m.monitor) >= threshold)?;
        if !Self::is_fair(cycle) {
            tracing::debug!(length = cycle.len(), "hot cycle starves an enabled operation");
            return None;
        }

        let range = self.history[start].trace_index..self.history[end].trace_index;
        Some(LivenessVerdict {
            error: Error::liveness(format!(
                "Monitor '{}' detected potential liveness bug in hot state '{}'.",
                monitor.monitor, monitor.state
            )),
            cycle: Some(range),
        })
    }

    fn streak(&self, monitor: &str) -> u64 {
        self.hot_streaks.get(monitor).copied().unwrap_or(0)
    }

    /// Every operation that stayed enabled across the cycle ran inside it.
    fn is_fair(cycle: &[Step]) -> bool {
        let Some(first) = cycle.first() else {
            return true;
        };
        first
            .enabled
            .iter()
            .filter(|op| cycle.iter().all(|step| step.enabled.contains(op)))
            .all(|op| cycle.iter().any(|step| step.scheduled == *op))
    }

    /// The verdict for a run that ended naturally with monitors still hot.
    pub(crate) fn end_of_run(hot: &[HotMonitor]) -> Option<Error> {
        hot.first().map(|monitor| {
            Error::liveness(format!(
                "Monitor '{}' detected liveness bug in hot state '{}' at the end of program execution.",
                monitor.monitor, monitor.state
            ))
        })
    }
}
