//! Environment variable overrides for [`TestConfig`].
//!
//! # Configuration Precedence
//!
//! 1. **Programmatic**: builder methods called after loading
//! 2. **Environment variables**: `LOCKSTEP_*`
//! 3. **Defaults**: [`TestConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `LOCKSTEP_STRATEGY` | `dfs`/`random`/`priority`/`replay` | `strategy` |
//! | `LOCKSTEP_ITERATIONS` | `u64` | `iterations` |
//! | `LOCKSTEP_MAX_STEPS` | `u64` | `max_steps` |
//! | `LOCKSTEP_SEED` | `u64` | `seed` |
//! | `LOCKSTEP_CYCLE_DETECTION` | `bool` | `cycle_detection` |
//! | `LOCKSTEP_LIVENESS_THRESHOLD` | `u64` | `liveness_temperature_threshold` |
//! | `LOCKSTEP_PRIORITY_CHANGE_POINTS` | `u32` | `priority_change_points` |
//! | `LOCKSTEP_STOP_ON_FIRST_BUG` | `bool` | `stop_on_first_bug` |
//! | `LOCKSTEP_TRACE_FILE` | path | `trace_file` |

use super::config::{ConfigError, StrategyKind, TestConfig};

/// Environment variable name for the exploration strategy.
pub const ENV_STRATEGY: &str = "LOCKSTEP_STRATEGY";
/// Environment variable name for the iteration count.
pub const ENV_ITERATIONS: &str = "LOCKSTEP_ITERATIONS";
/// Environment variable name for the per-schedule step bound.
pub const ENV_MAX_STEPS: &str = "LOCKSTEP_MAX_STEPS";
/// Environment variable name for the seed.
pub const ENV_SEED: &str = "LOCKSTEP_SEED";
/// Environment variable name for cycle detection.
pub const ENV_CYCLE_DETECTION: &str = "LOCKSTEP_CYCLE_DETECTION";
/// Environment variable name for the liveness temperature threshold.
pub const ENV_LIVENESS_THRESHOLD: &str = "LOCKSTEP_LIVENESS_THRESHOLD";
/// Environment variable name for priority change points.
pub const ENV_PRIORITY_CHANGE_POINTS: &str = "LOCKSTEP_PRIORITY_CHANGE_POINTS";
/// Environment variable name for stopping at the first bug.
pub const ENV_STOP_ON_FIRST_BUG: &str = "LOCKSTEP_STOP_ON_FIRST_BUG";
/// Environment variable name for the replay trace path.
pub const ENV_TRACE_FILE: &str = "LOCKSTEP_TRACE_FILE";

/// Apply environment variable overrides to a [`TestConfig`].
///
/// Only variables that are set in the environment are applied.
///
/// # Errors
///
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut TestConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_STRATEGY) {
        config.strategy = parse_strategy(ENV_STRATEGY, &val)?;
    }
    if let Some(val) = read_env(ENV_ITERATIONS) {
        config.iterations = parse_u64(ENV_ITERATIONS, &val)?;
    }
    if let Some(val) = read_env(ENV_MAX_STEPS) {
        config.max_steps = parse_u64(ENV_MAX_STEPS, &val)?;
    }
    if let Some(val) = read_env(ENV_SEED) {
        config.seed = parse_u64(ENV_SEED, &val)?;
    }
    if let Some(val) = read_env(ENV_CYCLE_DETECTION) {
        config.cycle_detection = parse_bool(ENV_CYCLE_DETECTION, &val)?;
    }
    if let Some(val) = read_env(ENV_LIVENESS_THRESHOLD) {
        config.liveness_temperature_threshold = parse_u64(ENV_LIVENESS_THRESHOLD, &val)?;
    }
    if let Some(val) = read_env(ENV_PRIORITY_CHANGE_POINTS) {
        config.priority_change_points = parse_u32(ENV_PRIORITY_CHANGE_POINTS, &val)?;
    }
    if let Some(val) = read_env(ENV_STOP_ON_FIRST_BUG) {
        config.stop_on_first_bug = parse_bool(ENV_STOP_ON_FIRST_BUG, &val)?;
    }
    if let Some(val) = read_env(ENV_TRACE_FILE) {
        config.trace_file = Some(val.into());
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn invalid(var_name: &str, val: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidEnv {
        var: var_name.to_string(),
        value: val.to_string(),
        expected,
    }
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| invalid(var_name, val, "unsigned integer"))
}

fn parse_u32(var_name: &str, val: &str) -> Result<u32, ConfigError> {
    val.trim()
        .parse::<u32>()
        .map_err(|_| invalid(var_name, val, "u32"))
}

fn parse_bool(var_name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(var_name, val, "bool (true/false/1/0/yes/no)")),
    }
}

fn parse_strategy(var_name: &str, val: &str) -> Result<StrategyKind, ConfigError> {
    val.parse::<StrategyKind>()
        .map_err(|_| invalid(var_name, val, "one of dfs, random, priority, replay"))
}
