#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use evotrader::domain::error::EngineError;
use evotrader::domain::genome::Genome;
use evotrader::domain::market::{Direction, PriceEvent, SpreadSignal};
use evotrader::domain::risk::{RiskConfig, RiskGate, SharedRiskGate};
use evotrader::domain::simulator::Simulator;
use evotrader::ports::event_port::EventPort;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct MockEventPort {
    pub events: Vec<PriceEvent>,
    pub error: Option<String>,
}

impl MockEventPort {
    pub fn new(events: Vec<PriceEvent>) -> Self {
        Self {
            events,
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            events: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

impl EventPort for MockEventPort {
    fn fetch_events(&self, symbol: Option<&str>) -> Result<Vec<PriceEvent>, EngineError> {
        if let Some(reason) = &self.error {
            return Err(EngineError::EventData {
                reason: reason.clone(),
            });
        }
        Ok(self
            .events
            .iter()
            .filter(|e| symbol.is_none_or(|s| e.symbol == s))
            .cloned()
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let mut symbols: Vec<String> = self.events.iter().map(|e| e.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

pub fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// 2024-03-`day` at `h:m:s`.
pub fn ts(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

pub fn quote(symbol: &str, at: NaiveDateTime, primary: f64, secondary: f64) -> PriceEvent {
    PriceEvent {
        symbol: symbol.to_string(),
        timestamp: at,
        primary_price: primary,
        secondary_price: secondary,
        volume: Some(1_000),
    }
}

pub fn actionable_signal(
    symbol: &str,
    at: NaiveDateTime,
    spread_pct: f64,
    ticks_stable: u32,
) -> SpreadSignal {
    SpreadSignal {
        symbol: symbol.to_string(),
        timestamp: at,
        current_spread_pct: spread_pct,
        avg_spread_pct: spread_pct / 2.0,
        z_score: 2.0,
        signal_strength: 0.5,
        direction: Direction::PrimaryCheaper,
        ticks_stable,
        is_actionable: true,
        reason: "test".to_string(),
    }
}

pub fn shared_gate(capital: f64) -> SharedRiskGate {
    RiskGate::new(RiskConfig::default(), capital).shared()
}

pub fn simulator_with(genomes: Vec<Genome>, capital: f64) -> Simulator {
    let mut sim = Simulator::new(shared_gate(capital), capital);
    sim.load_population(genomes);
    sim
}

/// One simulated session per day: a quiet baseline with the secondary
/// venue 0.01% rich, a five-tick spike to 0.2%, then quiet again.
pub fn spike_day(symbol: &str, day: u32) -> Vec<PriceEvent> {
    let mut events = Vec::new();
    let mut second = 0;
    let mut push = |secondary: f64| {
        let at = ts(day, 10, second / 60, second % 60);
        events.push(quote(symbol, at, 100.0, secondary));
        second += 1;
    };
    for _ in 0..40 {
        push(100.01);
    }
    for _ in 0..5 {
        push(100.20);
    }
    for _ in 0..15 {
        push(100.01);
    }
    events
}

pub fn spike_days(symbol: &str, days: std::ops::RangeInclusive<u32>) -> Vec<PriceEvent> {
    days.flat_map(|d| spike_day(symbol, d)).collect()
}
