//! Strategy performance metrics, the composite score and ranking.

use chrono::Duration;

use super::genome::Genome;
use super::position::Trade;
use super::strategy_state::StrategyState;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Weights of the five composite sub-scores. They should sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    pub sharpe: f64,
    pub return_pct: f64,
    pub drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            sharpe: 0.35,
            return_pct: 0.25,
            drawdown: 0.20,
            win_rate: 0.10,
            profit_factor: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PerformanceMetrics {
    pub genome_id: String,
    pub strategy_name: String,
    pub generation: u32,
    pub net_pnl: f64,
    pub return_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_trade_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub avg_hold: Duration,
    pub trades_per_day: f64,
    pub composite_score: f64,
}

impl PerformanceMetrics {
    fn empty(state: &StrategyState) -> Self {
        let genome = state.genome();
        PerformanceMetrics {
            genome_id: genome.id().to_string(),
            strategy_name: genome.name().to_string(),
            generation: genome.generation(),
            net_pnl: state.total_pnl(),
            return_pct: state.return_pct(),
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            max_drawdown: state.max_drawdown(),
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_factor: 0.0,
            avg_trade_pnl: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            avg_hold: Duration::zero(),
            trades_per_day: 0.0,
            composite_score: 0.0,
        }
    }
}

/// A genome with its metrics, as returned by [`Evaluator::rank_strategies`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankedStrategy {
    pub genome: Genome,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluator {
    weights: ScoreWeights,
    risk_free_rate: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new(ScoreWeights::default(), 0.05)
    }
}

impl Evaluator {
    pub fn new(weights: ScoreWeights, risk_free_rate: f64) -> Self {
        Evaluator {
            weights,
            risk_free_rate,
        }
    }

    /// Metrics for one strategy. A strategy with no closed trades scores 0.
    pub fn calculate(&self, state: &StrategyState, trading_days: u32) -> PerformanceMetrics {
        let mut m = PerformanceMetrics::empty(state);
        let trades = state.trades();
        if trades.is_empty() {
            return m;
        }
        let days = trading_days.max(1) as f64;

        let mut hold_secs = 0i64;
        for trade in trades {
            if trade.is_win() {
                m.winning_trades += 1;
                m.gross_profit += trade.pnl;
            } else {
                m.losing_trades += 1;
                m.gross_loss += trade.pnl.abs();
            }
            hold_secs += trade.hold_duration().num_seconds();
        }

        m.total_trades = trades.len();
        let n = m.total_trades as f64;
        m.win_rate = m.winning_trades as f64 / n * 100.0;
        m.profit_factor = if m.gross_loss > 0.0 {
            m.gross_profit / m.gross_loss
        } else if m.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        m.avg_trade_pnl = m.net_pnl / n;
        if m.winning_trades > 0 {
            m.avg_win = m.gross_profit / m.winning_trades as f64;
        }
        if m.losing_trades > 0 {
            m.avg_loss = m.gross_loss / m.losing_trades as f64;
        }
        m.avg_hold = Duration::seconds(hold_secs / m.total_trades as i64);
        m.trades_per_day = n / days;

        let daily_rf = self.risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe, sortino) = compute_risk_adjusted(trades, daily_rf, days);
        m.sharpe_ratio = sharpe;
        m.sortino_ratio = sortino;
        m.composite_score = self.composite_score(&m);
        m
    }

    /// Weighted sum of five sub-scores, each clamped to [0, 1], on a 0-100
    /// scale.
    pub fn composite_score(&self, m: &PerformanceMetrics) -> f64 {
        let sharpe = ((m.sharpe_ratio + 2.0) / 6.0).clamp(0.0, 1.0);
        let ret = ((m.return_pct + 50.0) / 100.0).clamp(0.0, 1.0);
        let drawdown = 1.0 - (m.max_drawdown * 2.0).min(1.0);
        let win_rate = (m.win_rate / 100.0).clamp(0.0, 1.0);
        let profit_factor = (m.profit_factor / 3.0).clamp(0.0, 1.0);

        let w = &self.weights;
        (w.sharpe * sharpe
            + w.return_pct * ret
            + w.drawdown * drawdown
            + w.win_rate * win_rate
            + w.profit_factor * profit_factor)
            * 100.0
    }

    /// Strategies by composite score, best first. Equal scores keep their
    /// input order.
    pub fn rank_strategies(&self, states: &[StrategyState], trading_days: u32) -> Vec<RankedStrategy> {
        let mut ranked: Vec<RankedStrategy> = states
            .iter()
            .map(|s| RankedStrategy {
                genome: s.genome().clone(),
                metrics: self.calculate(s, trading_days),
            })
            .collect();
        ranked.sort_by(|a, b| b.metrics.composite_score.total_cmp(&a.metrics.composite_score));
        ranked
    }
}

/// Sharpe and Sortino over per-trade percentage returns, annualised by
/// `sqrt(252 / days)`.
fn compute_risk_adjusted(trades: &[Trade], daily_rf: f64, days: f64) -> (f64, f64) {
    if trades.len() < 2 {
        return (0.0, 0.0);
    }
    let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let std = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let scale = (TRADING_DAYS_PER_YEAR / days).sqrt();

    let sharpe = if std > 0.0 {
        (mean - daily_rf) / std * scale
    } else {
        0.0
    };

    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sortino = if negatives.is_empty() {
        if mean > 0.0 { f64::INFINITY } else { 0.0 }
    } else {
        let k = negatives.len() as f64;
        let neg_mean = negatives.iter().sum::<f64>() / k;
        let downside = (negatives.iter().map(|r| (r - neg_mean).powi(2)).sum::<f64>() / k).sqrt();
        if downside > 0.0 {
            mean / downside * scale
        } else {
            0.0
        }
    };

    (sharpe, sortino)
}

/// Fixed-width leaderboard table.
pub fn performance_summary(ranked: &[RankedStrategy]) -> String {
    let mut lines = vec![
        "Strategy Performance Summary".to_string(),
        "=".repeat(74),
        format!(
            "{:<5} {:<16} {:>10} {:>8} {:>7} {:>7} {:>8} {:>6}",
            "Rank", "Strategy", "P&L", "Sharpe", "Win%", "DD%", "Score", "Trades"
        ),
        "-".repeat(74),
    ];
    for (i, r) in ranked.iter().enumerate() {
        let m = &r.metrics;
        lines.push(format!(
            "{:<5} {:<16} {:>10.2} {:>8.2} {:>6.1}% {:>6.2}% {:>8.1} {:>6}",
            i + 1,
            m.strategy_name,
            m.net_pnl,
            m.sharpe_ratio,
            m.win_rate,
            m.max_drawdown * 100.0,
            m.composite_score,
            m.total_trades
        ));
    }
    lines.join("\n")
}
