#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use lockstep::lab::ExplorationStrategy;
use lockstep::{BugReport, ErrorKind, Runtime, StrategyKind, TestConfig, TestEngine, TestReport};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed used by test helpers.
pub const DEFAULT_TEST_SEED: u64 = 0xDEAD_BEEF;
/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "LOCKSTEP_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// Initialize test logging with debug-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::DEBUG);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// DFS configuration used by most tests.
#[must_use]
pub fn dfs_config() -> TestConfig {
    TestConfig::new(StrategyKind::Dfs)
        .iterations(1_000)
        .max_steps(1_000)
}

/// Random configuration seeded with [`DEFAULT_TEST_SEED`].
#[must_use]
pub fn random_config(iterations: u64) -> TestConfig {
    TestConfig::new(StrategyKind::Random)
        .iterations(iterations)
        .seed(DEFAULT_TEST_SEED)
}

/// Runs `test` and returns the report.
pub fn run_with<F>(config: TestConfig, test: F) -> TestReport
where
    F: Fn(&Runtime) + Send + Sync + 'static,
{
    init_test_logging();
    let mut engine = TestEngine::new(config).expect("valid test config");
    let report = engine.run(test);
    tracing::info!(report = %report, "exploration report");
    report
}

/// Runs `test` under a custom strategy and returns the report.
pub fn run_with_strategy<F>(
    config: TestConfig,
    strategy: Box<dyn ExplorationStrategy>,
    test: F,
) -> TestReport
where
    F: Fn(&Runtime) + Send + Sync + 'static,
{
    init_test_logging();
    let mut engine = TestEngine::with_strategy(config, strategy).expect("valid test config");
    let report = engine.run(test);
    tracing::info!(report = %report, "exploration report");
    report
}

/// Runs `test` and asserts that no schedule finds a bug.
pub fn run_expecting_success<F>(config: TestConfig, test: F) -> TestReport
where
    F: Fn(&Runtime) + Send + Sync + 'static,
{
    let report = run_with(config, test);
    assert!(report.is_success(), "expected no bug, got: {report}");
    report
}

/// Runs `test` and asserts that the first bug has `kind` and `message`.
pub fn run_expecting_bug<F>(
    config: TestConfig,
    kind: ErrorKind,
    message: &str,
    test: F,
) -> BugReport
where
    F: Fn(&Runtime) + Send + Sync + 'static,
{
    let report = run_with(config, test);
    let bug = report
        .first_bug()
        .cloned()
        .unwrap_or_else(|| panic!("expected {kind:?} '{message}', but no bug was found: {report}"));
    assert_eq!(bug.kind(), kind, "unexpected verdict: {bug}");
    assert_eq!(bug.message(), message, "unexpected message: {bug}");
    bug
}

/// Runs `test` and asserts that the first bug has `kind`, whatever its message.
pub fn run_expecting_bug_kind<F>(config: TestConfig, kind: ErrorKind, test: F) -> BugReport
where
    F: Fn(&Runtime) + Send + Sync + 'static,
{
    let report = run_with(config, test);
    let bug = report
        .first_bug()
        .cloned()
        .unwrap_or_else(|| panic!("expected {kind:?}, but no bug was found: {report}"));
    assert_eq!(bug.kind(), kind, "unexpected verdict: {bug}");
    bug
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
