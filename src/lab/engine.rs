//! The test engine: runs a test body under many schedules.
//!
//! Each iteration builds a fresh [`Runtime`], starts the body as the root
//! operation, and waits for the scheduler to reach a verdict. Whether
//! exploration continues after a bug depends on the verdict's
//! [`RunDisposition`] and on [`TestConfig::stop_on_first_bug`].
//!
//! # Example
//!
//! ```ignore
//! let mut engine = TestEngine::new(TestConfig::new(StrategyKind::Dfs))?;
//! let report = engine.run(|runtime| {
//!     let server = runtime.create_machine(&server_def, Server::default());
//!     runtime.send_event(server, Request);
//! });
//! assert!(report.is_success(), "{report}");
//! ```

use std::sync::Arc;

use super::config::TestConfig;
use super::report::{BugReport, TestReport};
use super::strategy::{ExplorationStrategy, ReplayStrategy};
use crate::error::{Error, ErrorKind, Result, RunDisposition};
use crate::runtime::operation::OperationKind;
use crate::runtime::scheduler::{RunOutcome, RunSettings, RunSummary};
use crate::runtime::Runtime;
use crate::trace::ScheduleTrace;

type TestBody = dyn Fn(&Runtime) + Send + Sync;

/// Drives exploration for one test.
pub struct TestEngine {
    config: TestConfig,
    strategy: Option<Box<dyn ExplorationStrategy>>,
}

impl TestEngine {
    /// Creates an engine with the strategy named by `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid, or a trace
    /// error if the replay trace cannot be loaded.
    pub fn new(config: TestConfig) -> Result<Self> {
        let strategy = config.build_strategy()?;
        Ok(Self {
            config,
            strategy: Some(strategy),
        })
    }

    /// Creates an engine with a caller-supplied strategy. The strategy field
    /// of `config` is ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the iteration or step bounds are
    /// zero.
    pub fn with_strategy(
        config: TestConfig,
        strategy: Box<dyn ExplorationStrategy>,
    ) -> Result<Self> {
        if config.iterations == 0 || config.max_steps == 0 {
            return Err(Error::configuration(
                "iterations and max_steps must be positive",
            ));
        }
        Ok(Self {
            config,
            strategy: Some(strategy),
        })
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Explores up to `config.iterations` schedules of `test`.
    pub fn run<F>(&mut self, test: F) -> TestReport
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let test: Arc<TestBody> = Arc::new(test);
        let name = self.strategy.as_ref().map_or("none", |s| s.name());
        let mut report = TestReport::new(name);
        tracing::info!(
            strategy = name,
            iterations = self.config.iterations,
            max_steps = self.config.max_steps,
            "starting exploration"
        );

        for iteration in 0..self.config.iterations {
            let Some(mut strategy) = self.strategy.take() else {
                break;
            };
            if !strategy.prepare_next_iteration(iteration) {
                tracing::debug!(iteration, "strategy has no more schedules");
                report.exhausted = true;
                self.strategy = Some(strategy);
                break;
            }

            let span = tracing::info_span!("iteration", iteration);
            let _enter = span.enter();
            let summary = execute(strategy, self.config.run_settings(), &test);
            self.strategy = summary.strategy;
            report.record_run(summary.steps, summary.trace.len());
            if record_outcome(
                &self.config,
                &mut report,
                iteration,
                summary.outcome,
                summary.trace,
            ) {
                break;
            }
        }

        tracing::info!(
            iterations = report.iterations,
            steps = report.total_steps,
            bugs = report.bugs.len(),
            exhausted = report.exhausted,
            "exploration finished"
        );
        report
    }

    /// Re-executes `test` under the recorded `trace`.
    ///
    /// The report holds the reproduced verdict, or a non-reproducible replay
    /// error if the program diverged from the trace.
    pub fn replay<F>(&self, trace: &ScheduleTrace, test: F) -> TestReport
    where
        F: Fn(&Runtime) + Send + Sync + 'static,
    {
        let test: Arc<TestBody> = Arc::new(test);
        let mut strategy: Box<dyn ExplorationStrategy> =
            Box::new(ReplayStrategy::new(trace.clone()));
        let mut report = TestReport::new(strategy.name());
        if !strategy.prepare_next_iteration(0) {
            return report;
        }
        tracing::info!(decisions = trace.len(), "replaying schedule");

        let span = tracing::info_span!("replay");
        let _enter = span.enter();
        let summary = execute(strategy, self.config.run_settings(), &test);
        report.record_run(summary.steps, summary.trace.len());
        let consumed = summary
            .strategy
            .as_ref()
            .map_or(true, |s| s.is_exhausted());
        let outcome = match summary.outcome {
            RunOutcome::Completed if !consumed => RunOutcome::Bug {
                error: Error::non_reproducible(format!(
                    "Program finished after {} of {} recorded decisions.",
                    summary.trace.len(),
                    trace.len()
                )),
                cycle: None,
            },
            other => other,
        };
        record_outcome(&self.config, &mut report, 0, outcome, summary.trace);
        report
    }
}

impl core::fmt::Debug for TestEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TestEngine")
            .field("config", &self.config)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name()))
            .finish()
    }
}

fn execute(
    strategy: Box<dyn ExplorationStrategy>,
    settings: RunSettings,
    test: &Arc<TestBody>,
) -> RunSummary {
    let runtime = Runtime::for_run(strategy, settings);
    let scheduler = Arc::clone(runtime.scheduler());
    let body = Arc::clone(test);
    let root = scheduler.try_spawn(
        OperationKind::Root,
        Box::new(move |_| body(&runtime)),
    );
    match root {
        Ok(root) => scheduler.start(root),
        Err(err) => scheduler.abort(err),
    }
    scheduler.wait_for_termination()
}

/// Adds the run's verdict to `report`; returns true if exploration stops.
fn record_outcome(
    config: &TestConfig,
    report: &mut TestReport,
    iteration: u64,
    outcome: RunOutcome,
    trace: ScheduleTrace,
) -> bool {
    let (error, cycle) = match outcome {
        RunOutcome::Completed => return false,
        RunOutcome::StepBoundReached => {
            report.step_bound_hits += 1;
            if !config.step_bound_is_bug {
                return false;
            }
            let error = Error::new(ErrorKind::LivenessViolation).with_message(format!(
                "Scheduling steps bound of {} reached.",
                config.max_steps
            ));
            (error, None)
        }
        RunOutcome::Bug { error, cycle } => (error, cycle),
    };

    let disposition = error.kind().run_disposition();
    tracing::warn!(
        iteration,
        kind = ?error.kind(),
        error = %error,
        decisions = trace.len(),
        "bug found"
    );
    report.bugs.push(BugReport {
        iteration,
        error,
        trace,
        cycle,
    });
    match disposition {
        RunDisposition::NextSchedule => config.stop_on_first_bug,
        RunDisposition::AbortReplay | RunDisposition::AbortTest => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::config::StrategyKind;

    #[test]
    fn empty_test_completes() {
        let mut engine = TestEngine::new(TestConfig::new(StrategyKind::Random).iterations(3))
            .expect("engine");
        let report = engine.run(|_| {});
        assert!(report.is_success());
        assert_eq!(report.iterations, 3);
    }

    #[test]
    fn assertion_failure_is_reported() {
        let mut engine =
            TestEngine::new(TestConfig::new(StrategyKind::Dfs)).expect("engine");
        let report = engine.run(|runtime| runtime.assert(false, "Error reached."));
        let bug = report.first_bug().expect("bug");
        assert_eq!(bug.kind(), ErrorKind::AssertionFailure);
        assert_eq!(bug.message(), "Error reached.");
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn dfs_exhausts_boolean_choices() {
        let mut engine =
            TestEngine::new(TestConfig::new(StrategyKind::Dfs).iterations(100)).expect("engine");
        let report = engine.run(|runtime| {
            let _ = runtime.random_boolean();
            let _ = runtime.random_boolean();
        });
        assert!(report.is_success());
        assert!(report.exhausted);
        assert_eq!(report.iterations, 4);
    }

    #[test]
    fn step_bound_can_count_as_bug() {
        let config = TestConfig::new(StrategyKind::Random)
            .iterations(2)
            .max_steps(5)
            .step_bound_is_bug(true);
        let mut engine = TestEngine::new(config).expect("engine");
        let report = engine.run(|runtime| loop {
            runtime.interleave();
        });
        assert_eq!(report.step_bound_hits, 1);
        assert_eq!(
            report.first_bug().map(BugReport::message),
            Some("Scheduling steps bound of 5 reached.")
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = TestEngine::new(TestConfig::default().iterations(0)).expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
