//! Per-genome simulation state: capital curve, open positions and the
//! append-only trade log.

use chrono::NaiveDateTime;
use std::collections::HashMap;

use super::genome::Genome;
use super::position::{ExitReason, Position, Trade};

#[derive(Debug, Clone)]
pub struct StrategyState {
    genome: Genome,
    initial_capital: f64,
    current_capital: f64,
    peak_capital: f64,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
    trade_counter: u64,
    daily_pnl: f64,
    daily_trades: u32,
    total_pnl: f64,
    wins: u32,
    losses: u32,
    max_drawdown: f64,
}

impl StrategyState {
    pub fn new(genome: Genome, initial_capital: f64) -> Self {
        StrategyState {
            genome,
            initial_capital,
            current_capital: initial_capital,
            peak_capital: initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            trade_counter: 0,
            daily_pnl: 0.0,
            daily_trades: 0,
            total_pnl: 0.0,
            wins: 0,
            losses: 0,
            max_drawdown: 0.0,
        }
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn genome_id(&self) -> &str {
        self.genome.id()
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn current_capital(&self) -> f64 {
        self.current_capital
    }

    pub fn peak_capital(&self) -> f64 {
        self.peak_capital
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn daily_trades(&self) -> u32 {
        self.daily_trades
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    /// Largest relative fall from peak seen so far, as a fraction.
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn total_trades(&self) -> usize {
        self.trades.len()
    }

    pub fn win_rate(&self) -> f64 {
        let closed = self.wins + self.losses;
        if closed == 0 {
            0.0
        } else {
            self.wins as f64 / closed as f64 * 100.0
        }
    }

    pub fn return_pct(&self) -> f64 {
        if self.initial_capital > 0.0 {
            (self.current_capital - self.initial_capital) / self.initial_capital * 100.0
        } else {
            0.0
        }
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub(crate) fn position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    /// Records a new position and counts it against today's trades.
    ///
    /// Returns the position back if the symbol already has one open.
    pub fn open_position(&mut self, position: Position) -> Result<(), Position> {
        if self.positions.contains_key(&position.symbol) {
            return Err(position);
        }
        self.daily_trades += 1;
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Closes the symbol's position at its last marked price and books the
    /// realised P&L.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_time: NaiveDateTime,
        reason: ExitReason,
    ) -> Option<&Trade> {
        let position = self.positions.remove(symbol)?;
        self.trade_counter += 1;
        let trade_id = format!("{}-{}", self.genome.id(), self.trade_counter);
        let trade = position.close(trade_id, self.genome.id(), exit_time, reason);

        self.current_capital += trade.pnl;
        self.daily_pnl += trade.pnl;
        self.total_pnl += trade.pnl;
        if trade.is_win() {
            self.wins += 1;
        } else {
            self.losses += 1;
        }

        if self.current_capital > self.peak_capital {
            self.peak_capital = self.current_capital;
        } else if self.current_capital < self.peak_capital && self.peak_capital > 0.0 {
            let drawdown = (self.peak_capital - self.current_capital) / self.peak_capital;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }

        self.trades.push(trade);
        self.trades.last()
    }

    pub fn reset_daily(&mut self) {
        self.daily_pnl = 0.0;
        self.daily_trades = 0;
    }
}
