//! The systematic testing lab.
//!
//! The lab provides:
//!
//! - Exploration strategies: DFS, random, priority, and replay ([`strategy`])
//! - Test configuration from code, JSON, or environment ([`config`], [`env_config`])
//! - The [`TestEngine`] that runs a test body under many schedules
//! - [`TestReport`]s with a reproducing trace for every bug found

pub mod config;
pub mod engine;
pub mod env_config;
pub mod report;
pub mod strategy;

pub use config::{ConfigError, StrategyKind, TestConfig};
pub use engine::TestEngine;
pub use report::{BugReport, TestReport};
pub use strategy::{
    DfsStrategy, ExplorationStrategy, PriorityStrategy, RandomStrategy, ReplayStrategy,
};
