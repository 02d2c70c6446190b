//! Simulated positions and the trades they close into.

use chrono::{Duration, NaiveDateTime};
use std::fmt;

use super::market::Leg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeExit,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TimeExit => "time_exit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open exposure: bought on `entry_leg`, marked and closed on `exit_leg`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub symbol: String,
    pub entry_leg: Leg,
    pub exit_leg: Leg,
    pub side: Side,
    pub quantity: u64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub deadline: NaiveDateTime,
    pub current_price: f64,
}

impl Position {
    /// Opens a long position on `entry_leg`, deriving the exit thresholds.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: impl Into<String>,
        entry_leg: Leg,
        quantity: u64,
        entry_price: f64,
        entry_time: NaiveDateTime,
        take_profit_pct: f64,
        stop_loss_pct: f64,
        max_hold_secs: u32,
    ) -> Self {
        Position {
            symbol: symbol.into(),
            entry_leg,
            exit_leg: entry_leg.other(),
            side: Side::Buy,
            quantity,
            entry_price,
            entry_time,
            take_profit_pct,
            stop_loss_pct,
            take_profit_price: entry_price * (1.0 + take_profit_pct / 100.0),
            stop_loss_price: entry_price * (1.0 - stop_loss_pct / 100.0),
            deadline: entry_time + Duration::seconds(i64::from(max_hold_secs)),
            current_price: entry_price,
        }
    }

    pub fn cost(&self) -> f64 {
        self.entry_price * self.quantity as f64
    }

    pub fn mark(&mut self, price: f64) {
        self.current_price = price;
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.quantity as f64
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        pnl_pct(self.unrealized_pnl(), self.cost())
    }

    /// The exit that fires at `now`, checked as time, then take-profit,
    /// then stop-loss.
    pub fn check_exit(&self, now: NaiveDateTime) -> Option<ExitReason> {
        if now >= self.deadline {
            return Some(ExitReason::TimeExit);
        }
        let pct = self.unrealized_pnl_pct();
        if pct >= self.take_profit_pct {
            Some(ExitReason::TakeProfit)
        } else if pct <= -self.stop_loss_pct {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }

    /// Consumes the position into its trade record at the last marked price.
    pub fn close(
        self,
        trade_id: String,
        genome_id: &str,
        exit_time: NaiveDateTime,
        exit_reason: ExitReason,
    ) -> Trade {
        let pnl = self.unrealized_pnl();
        Trade {
            trade_id,
            genome_id: genome_id.to_string(),
            pnl_pct: pnl_pct(pnl, self.cost()),
            symbol: self.symbol,
            entry_leg: self.entry_leg,
            exit_leg: self.exit_leg,
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
            exit_price: self.current_price,
            entry_time: self.entry_time,
            exit_time,
            pnl,
            exit_reason,
        }
    }
}

fn pnl_pct(pnl: f64, cost: f64) -> f64 {
    if cost > 0.0 { pnl / cost * 100.0 } else { 0.0 }
}

/// Immutable record of a closed position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    pub trade_id: String,
    pub genome_id: String,
    pub symbol: String,
    pub entry_leg: Leg,
    pub exit_leg: Leg,
    pub side: Side,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn hold_duration(&self) -> Duration {
        self.exit_time - self.entry_time
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
