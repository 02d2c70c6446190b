//! Paper-trading simulator: one independent [`StrategyState`] per genome,
//! all driven by the same event stream.
//!
//! Each event fans out over the genomes in parallel and joins before the
//! call returns. The only shared state is the risk gate, which is locked
//! once per entry check and once per booked trade.

use rayon::prelude::*;
use std::collections::HashMap;

use super::genome::Genome;
use super::market::{Leg, MarketRegime, PriceEvent, SpreadSignal};
use super::position::{Position, Trade};
use super::risk::{RiskDecision, SharedRiskGate, TradeRequest};
use super::strategy_state::StrategyState;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenedEntry {
    pub genome_id: String,
    pub symbol: String,
    pub leg: Leg,
    pub quantity: u64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub genome_id: String,
    pub decision: RiskDecision,
}

/// What happened across the population on one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub closed: Vec<Trade>,
    pub opened: Vec<OpenedEntry>,
    pub rejected: Vec<Rejection>,
}

#[derive(Default)]
struct StepOutcome {
    closed: Option<Trade>,
    opened: Option<OpenedEntry>,
    rejected: Option<Rejection>,
}

pub struct Simulator {
    states: Vec<StrategyState>,
    risk: SharedRiskGate,
    initial_capital: f64,
    regime: Option<MarketRegime>,
}

impl Simulator {
    pub fn new(risk: SharedRiskGate, initial_capital: f64) -> Self {
        Simulator {
            states: Vec::new(),
            risk,
            initial_capital,
            regime: None,
        }
    }

    /// Replaces the population with fresh states for `genomes`.
    pub fn load_population(&mut self, genomes: Vec<Genome>) {
        self.states = genomes
            .into_iter()
            .map(|g| StrategyState::new(g, self.initial_capital))
            .collect();
        tracing::info!(
            strategies = self.states.len(),
            capital = self.initial_capital,
            "simulator loaded population"
        );
    }

    /// Switches to the evolved population in the given order. Genomes
    /// already simulated keep their state; new ones start fresh; the rest
    /// are dropped along with their open positions.
    pub fn apply_population(&mut self, genomes: Vec<Genome>) {
        let mut previous: HashMap<String, StrategyState> = self
            .states
            .drain(..)
            .map(|s| (s.genome_id().to_string(), s))
            .collect();
        self.states = genomes
            .into_iter()
            .map(|g| {
                previous
                    .remove(g.id())
                    .unwrap_or_else(|| StrategyState::new(g, self.initial_capital))
            })
            .collect();
        tracing::info!(
            strategies = self.states.len(),
            dropped = previous.len(),
            "simulator switched population"
        );
    }

    pub fn set_regime(&mut self, regime: MarketRegime) {
        self.regime = Some(regime);
    }

    pub fn states(&self) -> &[StrategyState] {
        &self.states
    }

    pub fn state(&self, genome_id: &str) -> Option<&StrategyState> {
        self.states.iter().find(|s| s.genome_id() == genome_id)
    }

    pub fn reset_daily(&mut self) {
        for state in &mut self.states {
            state.reset_daily();
        }
    }

    /// Marks open positions and fires exits, then tries entries if the
    /// signal is actionable. Invalid events are logged and dropped.
    pub fn on_event(&mut self, event: &PriceEvent, signal: Option<&SpreadSignal>) -> TickReport {
        if let Err(rejection) = event.validate() {
            tracing::warn!(%rejection, "discarding malformed event");
            return TickReport::default();
        }

        let signal = signal.filter(|s| s.is_actionable && s.symbol == event.symbol);
        let max_position_pct = self.risk.lock().config().max_position_size_pct;
        let risk = &self.risk;
        let regime = self.regime.as_ref();

        let outcomes: Vec<StepOutcome> = self
            .states
            .par_iter_mut()
            .map(|state| {
                let mut outcome = StepOutcome {
                    closed: update_position(state, event, risk),
                    ..StepOutcome::default()
                };
                if let Some(signal) = signal {
                    match evaluate_entry(state, event, signal, regime, risk, max_position_pct) {
                        Some(Ok(opened)) => outcome.opened = Some(opened),
                        Some(Err(decision)) => {
                            outcome.rejected = Some(Rejection {
                                genome_id: state.genome_id().to_string(),
                                decision,
                            })
                        }
                        None => {}
                    }
                }
                outcome
            })
            .collect();

        let mut report = TickReport::default();
        for outcome in outcomes {
            report.closed.extend(outcome.closed);
            report.opened.extend(outcome.opened);
            report.rejected.extend(outcome.rejected);
        }
        report
    }
}

fn update_position(
    state: &mut StrategyState,
    event: &PriceEvent,
    risk: &SharedRiskGate,
) -> Option<Trade> {
    let position = state.position_mut(&event.symbol)?;
    position.mark(event.price(position.exit_leg));
    let reason = position.check_exit(event.timestamp)?;

    let trade = state
        .close_position(&event.symbol, event.timestamp, reason)?
        .clone();
    risk.lock()
        .record_trade(state.genome_id(), &trade.symbol, trade.pnl);
    tracing::debug!(
        strategy = state.genome().name(),
        symbol = %trade.symbol,
        exit_price = trade.exit_price,
        pnl = trade.pnl,
        reason = %reason,
        "exit"
    );
    Some(trade)
}

/// `None` when the genome passes on the signal, `Some(Err)` when the risk
/// gate refuses it.
fn evaluate_entry(
    state: &mut StrategyState,
    event: &PriceEvent,
    signal: &SpreadSignal,
    regime: Option<&MarketRegime>,
    risk: &SharedRiskGate,
    max_position_pct: f64,
) -> Option<Result<OpenedEntry, RiskDecision>> {
    if state.has_position(&event.symbol) {
        return None;
    }
    let genome = state.genome();
    let dna = genome.params();

    if let Some(regime) = regime {
        if !genome.is_compatible_with_regime(regime.session, regime.volatility) {
            return None;
        }
    }
    if signal.current_spread_pct < dna.min_spread_threshold {
        return None;
    }
    if signal.ticks_stable < dna.stability_ticks {
        return None;
    }
    if signal.current_spread_pct - dna.latency_buffer_pct <= 0.0 {
        return None;
    }

    let leg = signal.direction.cheaper_leg()?;
    let price = event.price(leg);
    let capital = state.current_capital();
    let value = capital * dna.position_size_pct.min(max_position_pct) / 100.0;
    let quantity = (value / price).floor() as u64;
    if quantity < 1 {
        return None;
    }

    let check = risk.lock().check_and_reserve(&TradeRequest {
        genome_id: genome.id(),
        symbol: &event.symbol,
        quantity,
        price,
        current_capital: capital,
    });
    if !check.is_approved() {
        return Some(Err(check.decision));
    }
    let quantity = check.final_quantity(quantity);

    let position = Position::open(
        event.symbol.clone(),
        leg,
        quantity,
        price,
        event.timestamp,
        dna.take_profit_pct,
        dna.stop_loss_pct,
        dna.max_hold_secs,
    );
    let opened = OpenedEntry {
        genome_id: genome.id().to_string(),
        symbol: event.symbol.clone(),
        leg,
        quantity,
        price,
    };
    tracing::debug!(
        strategy = genome.name(),
        symbol = %event.symbol,
        %leg,
        price,
        quantity,
        spread_pct = signal.current_spread_pct,
        "entry"
    );
    if state.open_position(position).is_err() {
        risk.lock().release_reservation(&opened.genome_id, &event.symbol);
        return None;
    }
    Some(Ok(opened))
}
