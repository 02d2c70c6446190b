//! Rolling spread statistics per symbol and the signals derived from them.

use std::collections::{HashMap, VecDeque};

use super::market::{Direction, PriceEvent, SpreadSignal};

/// Observations needed before a z-score is meaningful.
const MIN_OBSERVATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub window: usize,
    pub min_z_score: f64,
    pub min_stable_ticks: u32,
    pub min_spread_pct: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            window: 50,
            min_z_score: 1.5,
            min_stable_ticks: 3,
            min_spread_pct: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpreadStatistics {
    pub symbol: String,
    pub current_spread: f64,
    pub avg_spread: f64,
    pub std_spread: f64,
    pub max_spread_today: f64,
    pub min_spread_today: f64,
    pub observations: usize,
    pub signals_today: u32,
    pub current_stability: u32,
}

#[derive(Debug, Default)]
struct SymbolTrack {
    history: VecDeque<f64>,
    stability: u32,
    last_direction: Option<Direction>,
    daily_max: f64,
    daily_min: f64,
    signals_today: u32,
    last_signal: Option<SpreadSignal>,
}

#[derive(Debug, Default)]
pub struct SpreadAnalyzer {
    config: SignalConfig,
    symbols: HashMap<String, SymbolTrack>,
}

pub(crate) fn mean_std(values: impl ExactSizeIterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

impl SpreadAnalyzer {
    pub fn new(config: SignalConfig) -> Self {
        SpreadAnalyzer {
            config,
            symbols: HashMap::new(),
        }
    }

    /// Adds one observation and returns the signal for it.
    pub fn add_event(&mut self, event: &PriceEvent) -> SpreadSignal {
        let spread_pct = event.spread_pct();
        let direction = event.direction();
        let window = self.config.window.max(1);

        let track = self
            .symbols
            .entry(event.symbol.clone())
            .or_insert_with(|| SymbolTrack {
                daily_min: f64::INFINITY,
                ..SymbolTrack::default()
            });

        if track.history.len() == window {
            track.history.pop_front();
        }
        track.history.push_back(spread_pct);
        track.daily_max = track.daily_max.max(spread_pct);
        track.daily_min = track.daily_min.min(spread_pct);

        if track.last_direction == Some(direction) {
            track.stability += 1;
        } else {
            track.stability = 1;
        }
        track.last_direction = Some(direction);

        let signal = build_signal(&self.config, track, event, spread_pct, direction);
        if signal.is_actionable {
            track.signals_today += 1;
        }
        track.last_signal = Some(signal.clone());
        signal
    }

    pub fn signal(&self, symbol: &str) -> Option<&SpreadSignal> {
        self.symbols.get(symbol)?.last_signal.as_ref()
    }

    pub fn actionable_signals(&self) -> Vec<&SpreadSignal> {
        self.symbols
            .values()
            .filter_map(|t| t.last_signal.as_ref())
            .filter(|s| s.is_actionable)
            .collect()
    }

    pub fn statistics(&self, symbol: &str) -> Option<SpreadStatistics> {
        let track = self.symbols.get(symbol)?;
        let current = *track.history.back()?;
        let (avg, std) = mean_std(track.history.iter().copied());
        Some(SpreadStatistics {
            symbol: symbol.to_string(),
            current_spread: current,
            avg_spread: avg,
            std_spread: std,
            max_spread_today: track.daily_max,
            min_spread_today: if track.daily_min.is_finite() {
                track.daily_min
            } else {
                0.0
            },
            observations: track.history.len(),
            signals_today: track.signals_today,
            current_stability: track.stability,
        })
    }

    /// Statistics for every tracked symbol, ordered by symbol.
    pub fn all_statistics(&self) -> Vec<SpreadStatistics> {
        let mut stats: Vec<SpreadStatistics> = self
            .symbols
            .keys()
            .filter_map(|symbol| self.statistics(symbol))
            .collect();
        stats.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        stats
    }

    pub fn reset_daily(&mut self) {
        for track in self.symbols.values_mut() {
            track.daily_max = 0.0;
            track.daily_min = f64::INFINITY;
            track.signals_today = 0;
        }
        tracing::info!("spread analyzer daily stats reset");
    }
}

fn build_signal(
    config: &SignalConfig,
    track: &SymbolTrack,
    event: &PriceEvent,
    spread_pct: f64,
    direction: Direction,
) -> SpreadSignal {
    let stable = track.stability;
    if track.history.len() < MIN_OBSERVATIONS {
        return SpreadSignal {
            symbol: event.symbol.clone(),
            timestamp: event.timestamp,
            current_spread_pct: spread_pct,
            avg_spread_pct: spread_pct,
            z_score: 0.0,
            signal_strength: 0.0,
            direction,
            ticks_stable: stable,
            is_actionable: false,
            reason: format!("insufficient data (need {MIN_OBSERVATIONS}+ observations)"),
        };
    }

    let (avg, std) = mean_std(track.history.iter().copied());
    let z_score = if std > 0.0 { (spread_pct - avg) / std } else { 0.0 };
    let strength = (z_score.abs() / 3.0).min(1.0) * (stable as f64 / 5.0).min(1.0);

    let mut reasons = Vec::new();
    if z_score.abs() < config.min_z_score {
        reasons.push(format!(
            "z-score too low ({z_score:.2} < {})",
            config.min_z_score
        ));
    }
    if stable < config.min_stable_ticks {
        reasons.push(format!(
            "not stable enough ({stable} < {} ticks)",
            config.min_stable_ticks
        ));
    }
    if spread_pct < config.min_spread_pct {
        reasons.push(format!(
            "spread too small ({spread_pct:.4}% < {}%)",
            config.min_spread_pct
        ));
    }
    let is_actionable = reasons.is_empty();
    let reason = if is_actionable {
        format!("strong signal: z={z_score:.2}, stable for {stable} ticks")
    } else {
        reasons.join("; ")
    };

    SpreadSignal {
        symbol: event.symbol.clone(),
        timestamp: event.timestamp,
        current_spread_pct: spread_pct,
        avg_spread_pct: avg,
        z_score,
        signal_strength: strength,
        direction,
        ticks_stable: stable,
        is_actionable,
        reason,
    }
}
