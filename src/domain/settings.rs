//! Typed engine settings assembled from a [`ConfigPort`].

use crate::domain::champion::ChampionConfig;
use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::EngineError;
use crate::domain::generator::EvolutionConfig;
use crate::domain::metrics::ScoreWeights;
use crate::domain::risk::RiskConfig;
use crate::domain::spread_analyzer::SignalConfig;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub initial_capital: f64,
    /// `None` seeds the engine RNG from entropy.
    pub seed: Option<u64>,
    pub evolve_every_days: u32,
    pub risk: RiskConfig,
    pub evolution: EvolutionConfig,
    pub champion: ChampionConfig,
    pub weights: ScoreWeights,
    pub risk_free_rate: f64,
    pub signal: SignalConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            initial_capital: 10_000.0,
            seed: None,
            evolve_every_days: 1,
            risk: RiskConfig::default(),
            evolution: EvolutionConfig::default(),
            champion: ChampionConfig::default(),
            weights: ScoreWeights::default(),
            risk_free_rate: 0.05,
            signal: SignalConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Validates the config, then reads every key over the defaults.
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        validate_engine_config(config)?;
        let d = EngineSettings::default();

        let seed = config
            .get_string("engine", "seed")
            .and_then(|s| s.trim().parse::<u64>().ok());

        Ok(EngineSettings {
            initial_capital: config.get_double("engine", "initial_capital", d.initial_capital),
            seed,
            evolve_every_days: config.get_int(
                "engine",
                "evolve_every_days",
                i64::from(d.evolve_every_days),
            ) as u32,
            risk: RiskConfig {
                max_daily_loss_pct: config.get_double(
                    "risk",
                    "max_daily_loss_pct",
                    d.risk.max_daily_loss_pct,
                ),
                max_trades_per_day: config.get_int(
                    "risk",
                    "max_trades_per_day",
                    i64::from(d.risk.max_trades_per_day),
                ) as u32,
                max_position_size_pct: config.get_double(
                    "risk",
                    "max_position_size_pct",
                    d.risk.max_position_size_pct,
                ),
                max_total_exposure_pct: config.get_double(
                    "risk",
                    "max_total_exposure_pct",
                    d.risk.max_total_exposure_pct,
                ),
                volatility_multiplier: config.get_double(
                    "risk",
                    "volatility_multiplier",
                    d.risk.volatility_multiplier,
                ),
            },
            evolution: EvolutionConfig {
                population_size: config.get_int(
                    "engine",
                    "population_size",
                    d.evolution.population_size as i64,
                ) as usize,
                retire_fraction: config.get_double(
                    "evolution",
                    "retire_fraction",
                    d.evolution.retire_fraction,
                ),
                mutation_probability: config.get_double(
                    "evolution",
                    "mutation_probability",
                    d.evolution.mutation_probability,
                ),
            },
            champion: ChampionConfig {
                days_to_outperform: config.get_int(
                    "champion",
                    "days_to_outperform",
                    i64::from(d.champion.days_to_outperform),
                ) as u32,
                min_trades: config.get_int("champion", "min_trades", d.champion.min_trades as i64)
                    as usize,
                max_drawdown: config.get_double("champion", "max_drawdown", d.champion.max_drawdown),
            },
            weights: d.weights,
            risk_free_rate: config.get_double("scoring", "risk_free_rate", d.risk_free_rate),
            signal: SignalConfig {
                window: config.get_int("signal", "window", d.signal.window as i64) as usize,
                min_z_score: config.get_double("signal", "min_z_score", d.signal.min_z_score),
                min_stable_ticks: config.get_int(
                    "signal",
                    "min_stable_ticks",
                    i64::from(d.signal.min_stable_ticks),
                ) as u32,
                min_spread_pct: config.get_double(
                    "signal",
                    "min_spread_pct",
                    d.signal.min_spread_pct,
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn empty_config_yields_defaults() {
        let config = FileConfigAdapter::from_string("").unwrap();
        let settings = EngineSettings::from_port(&config).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn keys_override_defaults() {
        let config = FileConfigAdapter::from_string(
            "[engine]\npopulation_size = 12\nseed = 7\ninitial_capital = 50000\n\
             [risk]\nmax_trades_per_day = 20\n\
             [champion]\ndays_to_outperform = 5\n\
             [signal]\nwindow = 30\n",
        )
        .unwrap();
        let s = EngineSettings::from_port(&config).unwrap();
        assert_eq!(s.evolution.population_size, 12);
        assert_eq!(s.seed, Some(7));
        assert_eq!(s.initial_capital, 50_000.0);
        assert_eq!(s.risk.max_trades_per_day, 20);
        assert_eq!(s.champion.days_to_outperform, 5);
        assert_eq!(s.signal.window, 30);
        assert_eq!(s.risk.max_daily_loss_pct, 2.0);
    }

    #[test]
    fn invalid_config_is_rejected_before_reading() {
        let config = FileConfigAdapter::from_string("[risk]\nmax_trades_per_day = 5\n").unwrap();
        assert!(matches!(
            EngineSettings::from_port(&config),
            Err(EngineError::ConfigInvalid { .. })
        ));
    }
}
