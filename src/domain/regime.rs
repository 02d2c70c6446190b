//! Market regime classification from the recent event stream.
//!
//! Volatility is the standard deviation of percentage returns per venue,
//! averaged across venues. Liquidity compares recent volume to a slowly
//! adapting reference. Spread behaviour is noisy when the spread's standard
//! deviation reaches its mean.

use chrono::NaiveDateTime;
use std::collections::{HashMap, VecDeque};

use super::market::{
    Leg, Liquidity, MarketRegime, PriceEvent, Session, SpreadBehavior, Volatility,
};
use super::spread_analyzer::mean_std;

const PRICE_WINDOW: usize = 20;
const VOLUME_WINDOW: usize = PRICE_WINDOW * 10;
const SPREAD_WINDOW: usize = 50;
const RECENT_VOLUMES: usize = 10;
const VOLUME_ALPHA: f64 = 0.01;

const VOL_LOW: f64 = 0.5;
const VOL_HIGH: f64 = 1.5;
const LIQ_THIN: f64 = 0.5;
const LIQ_HEAVY: f64 = 1.5;

#[derive(Debug, Default)]
pub struct RegimeAnalyzer {
    prices: HashMap<(String, Leg), VecDeque<f64>>,
    volumes: HashMap<String, VecDeque<f64>>,
    reference_volumes: HashMap<String, f64>,
    spreads: HashMap<String, VecDeque<f64>>,
    last_time: Option<NaiveDateTime>,
    current: Option<MarketRegime>,
    volatility_sum: f64,
    volatility_readings: u64,
}

fn push_bounded<T>(buf: &mut VecDeque<T>, value: T, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(value);
}

impl RegimeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self, event: &PriceEvent) {
        for leg in [Leg::Primary, Leg::Secondary] {
            let buf = self
                .prices
                .entry((event.symbol.clone(), leg))
                .or_default();
            push_bounded(buf, event.price(leg), PRICE_WINDOW);
        }

        if let Some(volume) = event.volume.filter(|v| *v > 0) {
            let volume = volume as f64;
            let buf = self.volumes.entry(event.symbol.clone()).or_default();
            push_bounded(buf, volume, VOLUME_WINDOW);
            self.reference_volumes
                .entry(event.symbol.clone())
                .and_modify(|r| *r = VOLUME_ALPHA * volume + (1.0 - VOLUME_ALPHA) * *r)
                .or_insert(volume);
        }

        let buf = self.spreads.entry(event.symbol.clone()).or_default();
        push_bounded(buf, event.spread_pct(), SPREAD_WINDOW);

        self.last_time = Some(event.timestamp);
    }

    fn volatility(&self) -> (Volatility, f64) {
        let per_venue: Vec<f64> = self
            .prices
            .values()
            .filter(|p| p.len() >= 3)
            .map(|prices| {
                let returns: Vec<f64> = prices
                    .iter()
                    .zip(prices.iter().skip(1))
                    .map(|(prev, next)| (next - prev) / prev * 100.0)
                    .collect();
                mean_std(returns.into_iter()).1
            })
            .collect();
        if per_venue.is_empty() {
            return (Volatility::Medium, 0.0);
        }
        let avg = per_venue.iter().sum::<f64>() / per_venue.len() as f64;
        let category = if avg < VOL_LOW {
            Volatility::Low
        } else if avg > VOL_HIGH {
            Volatility::High
        } else {
            Volatility::Medium
        };
        (category, avg)
    }

    fn liquidity(&self) -> (Liquidity, f64) {
        let ratios: Vec<f64> = self
            .volumes
            .iter()
            .filter(|(_, v)| v.len() >= RECENT_VOLUMES)
            .filter_map(|(symbol, volumes)| {
                let reference = *self.reference_volumes.get(symbol)?;
                if reference <= 0.0 {
                    return None;
                }
                let recent = volumes.iter().rev().take(RECENT_VOLUMES).sum::<f64>()
                    / RECENT_VOLUMES as f64;
                Some(recent / reference)
            })
            .collect();
        if ratios.is_empty() {
            return (Liquidity::Normal, 1.0);
        }
        let avg = ratios.iter().sum::<f64>() / ratios.len() as f64;
        let category = if avg < LIQ_THIN {
            Liquidity::Thin
        } else if avg > LIQ_HEAVY {
            Liquidity::Heavy
        } else {
            Liquidity::Normal
        };
        (category, avg)
    }

    fn spread_behavior(&self) -> (SpreadBehavior, f64, f64) {
        let all: Vec<f64> = self.spreads.values().flatten().copied().collect();
        if all.len() < 5 {
            return (SpreadBehavior::Stable, 0.0, 0.0);
        }
        let (avg, std) = mean_std(all.into_iter());
        let category = if avg > 0.0 && std >= avg {
            SpreadBehavior::Noisy
        } else {
            SpreadBehavior::Stable
        };
        (category, avg, std)
    }

    /// Classifies the current regime, logging when a category changes.
    pub fn regime(&mut self) -> MarketRegime {
        let session = self
            .last_time
            .map(|t| Session::from_time(t.time()))
            .unwrap_or(Session::Closed);
        let (volatility, volatility_value) = self.volatility();
        let (liquidity, volume_ratio) = self.liquidity();
        let (spread_behavior, avg_spread, spread_std) = self.spread_behavior();

        let regime = MarketRegime {
            volatility,
            liquidity,
            spread_behavior,
            session,
            volatility_value,
            avg_spread,
            spread_std,
            volume_ratio,
        };

        if volatility_value > 0.0 {
            self.volatility_sum += volatility_value;
            self.volatility_readings += 1;
        }

        if let Some(prev) = &self.current {
            let changed = prev.volatility != regime.volatility
                || prev.liquidity != regime.liquidity
                || prev.spread_behavior != regime.spread_behavior
                || prev.session != regime.session;
            if changed {
                tracing::info!(from = %prev, to = %regime, "market regime changed");
            }
        }
        self.current = Some(regime.clone());
        regime
    }

    pub fn current(&self) -> Option<&MarketRegime> {
        self.current.as_ref()
    }

    /// Mean of every non-zero volatility reading so far.
    pub fn average_volatility(&self) -> f64 {
        if self.volatility_readings == 0 {
            0.0
        } else {
            self.volatility_sum / self.volatility_readings as f64
        }
    }
}

/// Open session, non-thin liquidity, and not both noisy and volatile.
pub fn is_favorable_for_trading(regime: &MarketRegime) -> bool {
    !(matches!(regime.session, Session::Closed | Session::PreOpen)
        || regime.liquidity == Liquidity::Thin
        || (regime.spread_behavior == SpreadBehavior::Noisy
            && regime.volatility == Volatility::High))
}
