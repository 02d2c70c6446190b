//! Configuration validation.
//!
//! Every key is optional; a present key must parse and fall inside its range.
//! The first bad key is reported.

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_engine_section(config)?;
    validate_risk_section(config)?;
    validate_evolution_section(config)?;
    validate_champion_section(config)?;
    validate_scoring_section(config)?;
    validate_signal_section(config)?;
    Ok(())
}

/// Parses `[section] key` as a float, `None` when the key is absent.
fn read_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, EngineError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(EngineError::invalid(
                section,
                key,
                format!("{} is not a number: {:?}", key, raw),
            )),
        },
    }
}

fn read_i64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, EngineError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            EngineError::invalid(section, key, format!("{} is not an integer: {:?}", key, raw))
        }),
    }
}

fn check_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    valid: impl Fn(f64) -> bool,
    reason: &str,
) -> Result<(), EngineError> {
    match read_f64(config, section, key)? {
        Some(v) if !valid(v) => Err(EngineError::invalid(section, key, reason)),
        _ => Ok(()),
    }
}

fn check_i64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    valid: impl Fn(i64) -> bool,
    reason: &str,
) -> Result<(), EngineError> {
    match read_i64(config, section, key)? {
        Some(v) if !valid(v) => Err(EngineError::invalid(section, key, reason)),
        _ => Ok(()),
    }
}

fn validate_engine_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    check_f64(
        config,
        "engine",
        "initial_capital",
        |v| v > 0.0,
        "initial_capital must be positive",
    )?;
    check_i64(
        config,
        "engine",
        "population_size",
        |v| (3..=20).contains(&v),
        "population_size must be between 3 and 20",
    )?;
    check_i64(
        config,
        "engine",
        "evolve_every_days",
        |v| v >= 1,
        "evolve_every_days must be at least 1",
    )?;
    if let Some(raw) = config.get_string("engine", "seed") {
        if raw.trim().parse::<u64>().is_err() {
            return Err(EngineError::invalid(
                "engine",
                "seed",
                "seed must be a non-negative integer",
            ));
        }
    }
    Ok(())
}

fn validate_risk_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    check_f64(
        config,
        "risk",
        "max_daily_loss_pct",
        |v| (0.5..=5.0).contains(&v),
        "max_daily_loss_pct must be between 0.5 and 5",
    )?;
    check_i64(
        config,
        "risk",
        "max_trades_per_day",
        |v| (10..=200).contains(&v),
        "max_trades_per_day must be between 10 and 200",
    )?;
    check_f64(
        config,
        "risk",
        "max_position_size_pct",
        |v| (1.0..=25.0).contains(&v),
        "max_position_size_pct must be between 1 and 25",
    )?;
    check_f64(
        config,
        "risk",
        "max_total_exposure_pct",
        |v| v > 0.0 && v <= 100.0,
        "max_total_exposure_pct must be in (0, 100]",
    )?;
    check_f64(
        config,
        "risk",
        "volatility_multiplier",
        |v| v > 1.0,
        "volatility_multiplier must be greater than 1",
    )?;
    Ok(())
}

fn validate_evolution_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    check_f64(
        config,
        "evolution",
        "retire_fraction",
        |v| (0.1..=0.5).contains(&v),
        "retire_fraction must be between 0.1 and 0.5",
    )?;
    check_f64(
        config,
        "evolution",
        "mutation_probability",
        |v| (0.0..=1.0).contains(&v),
        "mutation_probability must be between 0 and 1",
    )?;
    Ok(())
}

fn validate_champion_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    check_i64(
        config,
        "champion",
        "days_to_outperform",
        |v| v >= 1,
        "days_to_outperform must be at least 1",
    )?;
    check_i64(
        config,
        "champion",
        "min_trades",
        |v| v >= 0,
        "min_trades must be non-negative",
    )?;
    check_f64(
        config,
        "champion",
        "max_drawdown",
        |v| v > 0.0 && v <= 1.0,
        "max_drawdown must be in (0, 1]",
    )?;
    Ok(())
}

fn validate_scoring_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    check_f64(
        config,
        "scoring",
        "risk_free_rate",
        |v| (0.0..1.0).contains(&v),
        "risk_free_rate must be between 0 and 1",
    )
}

fn validate_signal_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    check_i64(
        config,
        "signal",
        "window",
        |v| v >= 5,
        "window must be at least 5",
    )?;
    check_f64(
        config,
        "signal",
        "min_z_score",
        |v| v >= 0.0,
        "min_z_score must be non-negative",
    )?;
    check_i64(
        config,
        "signal",
        "min_stable_ticks",
        |v| v >= 1,
        "min_stable_ticks must be at least 1",
    )?;
    check_f64(
        config,
        "signal",
        "min_spread_pct",
        |v| v >= 0.0,
        "min_spread_pct must be non-negative",
    )?;
    Ok(())
}
