//! Configuration for a systematic test.
//!
//! The test configuration controls exploration:
//! - which strategy picks schedules, and with which seed
//! - how many schedules to try, and how long each may run
//! - which liveness checks are active
//!
//! A configuration can be built in code, decoded from JSON, or read from
//! `LOCKSTEP_*` environment variables (see [`super::env_config`]).

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::strategy::{
    DfsStrategy, ExplorationStrategy, PriorityStrategy, RandomStrategy, ReplayStrategy,
};
use crate::error::{Error, ErrorKind};
use crate::monitor::LivenessSettings;
use crate::runtime::scheduler::RunSettings;
use crate::trace::{load_trace, TraceFileError};

/// Errors produced while building or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
        /// What was expected.
        expected: &'static str,
    },

    /// The configuration is inconsistent.
    #[error("invalid test configuration: {0}")]
    Invalid(String),

    /// Malformed JSON.
    #[error("config decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// The replay trace could not be loaded.
    #[error("failed to load replay trace: {0}")]
    Trace(#[from] TraceFileError),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Trace(trace) => trace.into(),
            other => Self::new(ErrorKind::Configuration)
                .with_message(other.to_string())
                .with_source(other),
        }
    }
}

/// The exploration strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Exhaustive depth-first search over all choices.
    Dfs,
    /// Uniformly random choices.
    #[default]
    Random,
    /// Probabilistic priority-based scheduling with change points.
    Priority,
    /// Replay of a recorded trace.
    Replay,
}

impl StrategyKind {
    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dfs => "dfs",
            Self::Random => "random",
            Self::Priority => "priority",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dfs" => Ok(Self::Dfs),
            "random" => Ok(Self::Random),
            "priority" | "pct" => Ok(Self::Priority),
            "replay" => Ok(Self::Replay),
            _ => Err(ConfigError::InvalidEnv {
                var: "strategy".to_string(),
                value: s.to_string(),
                expected: "one of dfs, random, priority, replay",
            }),
        }
    }
}

/// Configuration for a systematic test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Exploration strategy.
    pub strategy: StrategyKind,
    /// Maximum number of schedules to explore.
    pub iterations: u64,
    /// Maximum scheduling steps per schedule.
    pub max_steps: u64,
    /// Seed for the random and priority strategies.
    pub seed: u64,
    /// Report hot monitors that survive a repeated global state.
    pub cycle_detection: bool,
    /// Consecutive hot steps required before a liveness verdict.
    ///
    /// With cycle detection off, a positive value enables the
    /// temperature-only check; `0` disables it.
    pub liveness_temperature_threshold: u64,
    /// Number of priority change points per schedule.
    pub priority_change_points: u32,
    /// Avoid scheduling the same operation twice in a row (random strategy).
    pub repeat_penalty: bool,
    /// Stop after the first bug instead of exploring every iteration.
    pub stop_on_first_bug: bool,
    /// Report hitting the step bound as a bug.
    pub step_bound_is_bug: bool,
    /// Trace to replay when `strategy` is [`StrategyKind::Replay`].
    pub trace_file: Option<PathBuf>,
}

impl TestConfig {
    /// Creates a configuration with the given strategy and defaults.
    #[must_use]
    pub const fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            iterations: 100,
            max_steps: 10_000,
            seed: 42,
            cycle_detection: false,
            liveness_temperature_threshold: 0,
            priority_change_points: 2,
            repeat_penalty: false,
            stop_on_first_bug: true,
            step_bound_is_bug: false,
            trace_file: None,
        }
    }

    /// Default configuration with `LOCKSTEP_*` overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        super::env_config::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Decodes a configuration from JSON. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the strategy.
    #[must_use]
    pub const fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub const fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the per-schedule step bound.
    #[must_use]
    pub const fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    /// Sets the seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables or disables cycle detection.
    #[must_use]
    pub const fn cycle_detection(mut self, enabled: bool) -> Self {
        self.cycle_detection = enabled;
        self
    }

    /// Sets the liveness temperature threshold.
    #[must_use]
    pub const fn liveness_temperature_threshold(mut self, threshold: u64) -> Self {
        self.liveness_temperature_threshold = threshold;
        self
    }

    /// Sets the number of priority change points.
    #[must_use]
    pub const fn priority_change_points(mut self, points: u32) -> Self {
        self.priority_change_points = points;
        self
    }

    /// Enables or disables the repeat penalty of the random strategy.
    #[must_use]
    pub const fn repeat_penalty(mut self, enabled: bool) -> Self {
        self.repeat_penalty = enabled;
        self
    }

    /// Sets whether exploration stops at the first bug.
    #[must_use]
    pub const fn stop_on_first_bug(mut self, stop: bool) -> Self {
        self.stop_on_first_bug = stop;
        self
    }

    /// Sets whether the step bound counts as a bug.
    #[must_use]
    pub const fn step_bound_is_bug(mut self, is_bug: bool) -> Self {
        self.step_bound_is_bug = is_bug;
        self
    }

    /// Sets the trace replayed by [`StrategyKind::Replay`].
    #[must_use]
    pub fn trace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_file = Some(path.into());
        self
    }

    /// Checks the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::Invalid("iterations must be positive".into()));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be positive".into()));
        }
        if self.strategy == StrategyKind::Replay && self.trace_file.is_none() {
            return Err(ConfigError::Invalid(
                "the replay strategy needs a trace_file".into(),
            ));
        }
        Ok(())
    }

    /// Builds the configured strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the replay trace cannot be
    /// loaded.
    pub fn build_strategy(&self) -> Result<Box<dyn ExplorationStrategy>, ConfigError> {
        self.validate()?;
        let strategy: Box<dyn ExplorationStrategy> = match self.strategy {
            StrategyKind::Dfs => Box::new(DfsStrategy::new()),
            StrategyKind::Random => {
                Box::new(RandomStrategy::new(self.seed).with_repeat_penalty(self.repeat_penalty))
            }
            StrategyKind::Priority => Box::new(PriorityStrategy::new(
                self.seed,
                self.priority_change_points,
                self.max_steps,
            )),
            StrategyKind::Replay => {
                let path = self.trace_file.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("the replay strategy needs a trace_file".into())
                })?;
                Box::new(ReplayStrategy::new(load_trace(path)?))
            }
        };
        Ok(strategy)
    }

    pub(crate) const fn run_settings(&self) -> RunSettings {
        RunSettings {
            max_steps: self.max_steps,
            liveness: LivenessSettings {
                cycle_detection: self.cycle_detection,
                temperature_threshold: self.liveness_temperature_threshold,
            },
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new(StrategyKind::default())
    }
}
