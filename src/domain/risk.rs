//! Risk gate: the single policy every simulated entry passes through.
//!
//! Limits are enforced per genome (each strategy has its own daily budget and
//! exposure book) while the kill switch and volatility readings are global.
//! The gate is shared between the simulator's workers as [`SharedRiskGate`];
//! callers hold the lock across [`RiskGate::check_and_reserve`] so two entries
//! can never both pass a limit only one of them fits under.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type SharedRiskGate = Arc<Mutex<RiskGate>>;

/// Multiple of a limit past which the kill switch trips on its own.
const AUTO_KILL_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskConfig {
    pub max_daily_loss_pct: f64,
    pub max_trades_per_day: u32,
    pub max_position_size_pct: f64,
    pub max_total_exposure_pct: f64,
    pub volatility_multiplier: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_daily_loss_pct: 2.0,
            max_trades_per_day: 50,
            max_position_size_pct: 10.0,
            max_total_exposure_pct: 50.0,
            volatility_multiplier: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RiskDecision {
    Approved,
    RejectedKillSwitch,
    RejectedDailyLoss,
    RejectedTradeLimit,
    RejectedPositionSize,
    RejectedExposure,
    RejectedVolatility,
}

impl RiskDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskDecision::Approved => "approved",
            RiskDecision::RejectedKillSwitch => "rejected_kill_switch",
            RiskDecision::RejectedDailyLoss => "rejected_daily_loss",
            RiskDecision::RejectedTradeLimit => "rejected_trade_limit",
            RiskDecision::RejectedPositionSize => "rejected_position_size",
            RiskDecision::RejectedExposure => "rejected_exposure",
            RiskDecision::RejectedVolatility => "rejected_volatility",
        }
    }
}

impl fmt::Display for RiskDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheck {
    pub decision: RiskDecision,
    pub reason: String,
    /// Set only when the trade is approved at a smaller size.
    pub modified_quantity: Option<u64>,
}

impl RiskCheck {
    fn approved(modified_quantity: Option<u64>) -> Self {
        RiskCheck {
            decision: RiskDecision::Approved,
            reason: "all checks passed".to_string(),
            modified_quantity,
        }
    }

    fn rejected(decision: RiskDecision, reason: String) -> Self {
        RiskCheck {
            decision,
            reason,
            modified_quantity: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == RiskDecision::Approved
    }

    /// Quantity to trade given what was asked for.
    pub fn final_quantity(&self, requested: u64) -> u64 {
        self.modified_quantity.unwrap_or(requested)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest<'a> {
    pub genome_id: &'a str,
    pub symbol: &'a str,
    pub quantity: u64,
    pub price: f64,
    pub current_capital: f64,
}

impl TradeRequest<'_> {
    pub fn value(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

/// One genome's daily budget and open exposure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskBook {
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub exposure_by_symbol: HashMap<String, f64>,
}

impl RiskBook {
    pub fn total_exposure(&self) -> f64 {
        self.exposure_by_symbol.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskStatus {
    pub kill_switch_active: bool,
    pub kill_switch_reason: Option<String>,
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub total_exposure: f64,
    pub current_volatility: f64,
    pub avg_volatility: f64,
    pub books: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookStatus {
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub trades_remaining: u32,
    pub loss_remaining: f64,
    pub total_exposure: f64,
    pub can_trade: bool,
}

/// Shared entry gate for the whole population.
///
/// Each genome has its own [`RiskBook`]; the kill switch and volatility
/// readings are global. [`RiskGate::check_trade`] has no side effects, but
/// the simulator goes through [`RiskGate::check_and_reserve`], which counts
/// the trade and books its exposure at approval time. [`RiskGate::record_trade`]
/// later adds the realised P&L and frees the exposure. Reserving under the
/// same lock as the check keeps concurrent genomes from passing a limit that
/// only one of them fits under.
#[derive(Debug)]
pub struct RiskGate {
    config: RiskConfig,
    initial_capital: f64,
    books: HashMap<String, RiskBook>,
    kill_switch: bool,
    kill_switch_reason: Option<String>,
    current_volatility: f64,
    avg_volatility: f64,
}

impl RiskGate {
    pub fn new(config: RiskConfig, initial_capital: f64) -> Self {
        tracing::info!(
            max_daily_loss_pct = config.max_daily_loss_pct,
            max_trades_per_day = config.max_trades_per_day,
            max_position_size_pct = config.max_position_size_pct,
            "risk gate initialised"
        );
        RiskGate {
            config,
            initial_capital,
            books: HashMap::new(),
            kill_switch: false,
            kill_switch_reason: None,
            current_volatility: 0.0,
            avg_volatility: 0.0,
        }
    }

    pub fn shared(self) -> SharedRiskGate {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    fn daily_loss_limit(&self) -> f64 {
        self.config.max_daily_loss_pct / 100.0 * self.initial_capital
    }

    pub fn book(&self, genome_id: &str) -> Option<&RiskBook> {
        self.books.get(genome_id)
    }

    /// Evaluates a proposed entry without changing any state.
    ///
    /// Rules run in priority order and the first failure wins. The position
    /// size rule may shrink the trade instead of rejecting it; later rules
    /// then see the shrunk size.
    pub fn check_trade(&self, req: &TradeRequest<'_>) -> RiskCheck {
        if self.kill_switch {
            let reason = self.kill_switch_reason.as_deref().unwrap_or("unspecified");
            return RiskCheck::rejected(
                RiskDecision::RejectedKillSwitch,
                format!("kill switch active: {reason}"),
            );
        }

        let empty = RiskBook::default();
        let book = self.books.get(req.genome_id).unwrap_or(&empty);

        let loss_limit = self.daily_loss_limit();
        if book.daily_pnl <= -loss_limit {
            return RiskCheck::rejected(
                RiskDecision::RejectedDailyLoss,
                format!(
                    "daily loss {:.2} has reached limit {:.2}",
                    book.daily_pnl, loss_limit
                ),
            );
        }

        if book.daily_trades >= self.config.max_trades_per_day {
            return RiskCheck::rejected(
                RiskDecision::RejectedTradeLimit,
                format!(
                    "daily trade limit reached ({}/{})",
                    book.daily_trades, self.config.max_trades_per_day
                ),
            );
        }

        let mut quantity = req.quantity;
        let mut modified_quantity = None;
        let max_value = req.current_capital * self.config.max_position_size_pct / 100.0;
        if req.value() > max_value {
            let max_qty = if req.price > 0.0 {
                (max_value / req.price).floor() as u64
            } else {
                0
            };
            if max_qty < 1 {
                return RiskCheck::rejected(
                    RiskDecision::RejectedPositionSize,
                    format!(
                        "one unit at {:.2} exceeds position limit {:.2}",
                        req.price, max_value
                    ),
                );
            }
            quantity = max_qty;
            modified_quantity = Some(max_qty);
        }
        let value = quantity as f64 * req.price;

        let max_exposure = req.current_capital * self.config.max_total_exposure_pct / 100.0;
        let exposure_after = book.total_exposure() + value;
        if exposure_after > max_exposure {
            return RiskCheck::rejected(
                RiskDecision::RejectedExposure,
                format!(
                    "exposure {:.2} would exceed limit {:.2}",
                    exposure_after, max_exposure
                ),
            );
        }

        if self.avg_volatility > 0.0 {
            let ratio = self.current_volatility / self.avg_volatility;
            if ratio > self.config.volatility_multiplier {
                return RiskCheck::rejected(
                    RiskDecision::RejectedVolatility,
                    format!(
                        "volatility {:.1}x average exceeds {:.1}x",
                        ratio, self.config.volatility_multiplier
                    ),
                );
            }
        }

        RiskCheck::approved(modified_quantity)
    }

    /// Checks an entry and, if approved, books its exposure and counts it
    /// against the genome's daily trades.
    pub fn check_and_reserve(&mut self, req: &TradeRequest<'_>) -> RiskCheck {
        let check = self.check_trade(req);
        if check.is_approved() {
            let value = check.final_quantity(req.quantity) as f64 * req.price;
            let book = self.books.entry(req.genome_id.to_string()).or_default();
            *book
                .exposure_by_symbol
                .entry(req.symbol.to_string())
                .or_insert(0.0) += value;
            book.daily_trades += 1;
        } else {
            tracing::debug!(
                genome = req.genome_id,
                symbol = req.symbol,
                decision = %check.decision,
                reason = %check.reason,
                "entry blocked by risk gate"
            );
        }
        check
    }

    /// Undoes a reservation whose position never opened.
    pub fn release_reservation(&mut self, genome_id: &str, symbol: &str) {
        if let Some(book) = self.books.get_mut(genome_id) {
            if book.exposure_by_symbol.remove(symbol).is_some() {
                book.daily_trades = book.daily_trades.saturating_sub(1);
            }
        }
    }

    /// Books a completed trade: adds its P&L to the genome's day and frees
    /// the symbol's exposure. Trips the kill switch when the day's combined
    /// loss passes 1.5x the combined limit.
    pub fn record_trade(&mut self, genome_id: &str, symbol: &str, pnl: f64) {
        let book = self.books.entry(genome_id.to_string()).or_default();
        book.daily_pnl += pnl;
        book.exposure_by_symbol.remove(symbol);

        let combined_limit = self.daily_loss_limit() * self.books.len().max(1) as f64;
        let combined_pnl = self.daily_pnl();
        if !self.kill_switch && combined_pnl < -(combined_limit * AUTO_KILL_FACTOR) {
            self.activate_kill_switch(format!(
                "daily loss {combined_pnl:.2} exceeded {AUTO_KILL_FACTOR}x limit"
            ));
        }
    }

    /// Records the latest volatility readings. A ratio past 1.5x the
    /// circuit-breaker multiplier trips the kill switch.
    pub fn update_volatility(&mut self, current: f64, average: f64) {
        self.current_volatility = current;
        self.avg_volatility = average;
        if average > 0.0 && !self.kill_switch {
            let ratio = current / average;
            if ratio > self.config.volatility_multiplier * AUTO_KILL_FACTOR {
                self.activate_kill_switch(format!("extreme volatility: {ratio:.1}x average"));
            }
        }
    }

    pub fn activate_kill_switch(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "kill switch activated");
        self.kill_switch = true;
        self.kill_switch_reason = Some(reason);
    }

    pub fn deactivate_kill_switch(&mut self) {
        if self.kill_switch {
            tracing::warn!("kill switch deactivated");
        }
        self.kill_switch = false;
        self.kill_switch_reason = None;
    }

    pub fn is_kill_switch_active(&self) -> bool {
        self.kill_switch
    }

    /// Clears every book's daily P&L and trade count. Exposure and the kill
    /// switch carry over.
    pub fn reset_daily(&mut self) {
        for book in self.books.values_mut() {
            book.daily_pnl = 0.0;
            book.daily_trades = 0;
        }
        tracing::info!("risk gate daily counters reset");
    }

    /// Drops the books of genomes no longer in the population.
    pub fn retain_books(&mut self, active: &[&str]) {
        self.books.retain(|id, _| active.contains(&id.as_str()));
    }

    pub fn daily_pnl(&self) -> f64 {
        self.books.values().map(|b| b.daily_pnl).sum()
    }

    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            kill_switch_active: self.kill_switch,
            kill_switch_reason: self.kill_switch_reason.clone(),
            daily_pnl: self.daily_pnl(),
            daily_trades: self.books.values().map(|b| b.daily_trades).sum(),
            total_exposure: self.books.values().map(RiskBook::total_exposure).sum(),
            current_volatility: self.current_volatility,
            avg_volatility: self.avg_volatility,
            books: self.books.len(),
        }
    }

    pub fn book_status(&self, genome_id: &str) -> BookStatus {
        let empty = RiskBook::default();
        let book = self.books.get(genome_id).unwrap_or(&empty);
        let limit = self.daily_loss_limit();
        BookStatus {
            daily_pnl: book.daily_pnl,
            daily_trades: book.daily_trades,
            trades_remaining: self
                .config
                .max_trades_per_day
                .saturating_sub(book.daily_trades),
            loss_remaining: (limit + book.daily_pnl).max(0.0),
            total_exposure: book.total_exposure(),
            can_trade: !self.kill_switch
                && book.daily_pnl > -limit
                && book.daily_trades < self.config.max_trades_per_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default(), 100_000.0)
    }

    fn req(quantity: u64, price: f64) -> TradeRequest<'static> {
        TradeRequest {
            genome_id: "g1",
            symbol: "RELIANCE",
            quantity,
            price,
            current_capital: 100_000.0,
        }
    }

    #[test]
    fn small_trade_is_approved_unchanged() {
        let check = gate().check_trade(&req(2, 2450.0));
        assert!(check.is_approved());
        assert_eq!(check.modified_quantity, None);
        assert_eq!(check.final_quantity(2), 2);
    }

    #[test]
    fn oversized_trade_is_resized_not_rejected() {
        // 15,000 against a 10% cap on 100,000
        let check = gate().check_trade(&req(10, 1500.0));
        assert_eq!(check.decision, RiskDecision::Approved);
        assert_eq!(check.modified_quantity, Some(6));
    }

    #[test]
    fn unit_above_cap_is_rejected() {
        let check = gate().check_trade(&req(1, 20_000.0));
        assert_eq!(check.decision, RiskDecision::RejectedPositionSize);
    }

    #[test]
    fn kill_switch_rejects_everything_until_deactivated() {
        let mut g = gate();
        g.activate_kill_switch("manual");
        let check = g.check_trade(&req(1, 100.0));
        assert_eq!(check.decision, RiskDecision::RejectedKillSwitch);
        assert!(check.reason.contains("manual"));
        g.reset_daily();
        assert!(g.is_kill_switch_active());
        g.deactivate_kill_switch();
        assert!(g.check_trade(&req(1, 100.0)).is_approved());
    }

    #[test]
    fn daily_loss_limit_blocks_before_trade_limit() {
        let mut g = RiskGate::new(
            RiskConfig {
                max_trades_per_day: 1,
                ..RiskConfig::default()
            },
            100_000.0,
        );
        assert!(g.check_and_reserve(&req(1, 100.0)).is_approved());
        g.record_trade("g1", "RELIANCE", -2_000.0);
        let check = g.check_trade(&req(1, 100.0));
        assert_eq!(check.decision, RiskDecision::RejectedDailyLoss);
    }

    #[test]
    fn trade_limit_counts_reservations() {
        let mut g = RiskGate::new(
            RiskConfig {
                max_trades_per_day: 2,
                ..RiskConfig::default()
            },
            100_000.0,
        );
        for symbol in ["A", "B"] {
            let r = TradeRequest {
                symbol,
                ..req(1, 100.0)
            };
            assert!(g.check_and_reserve(&r).is_approved());
        }
        let check = g.check_trade(&TradeRequest {
            symbol: "C",
            ..req(1, 100.0)
        });
        assert_eq!(check.decision, RiskDecision::RejectedTradeLimit);
        g.reset_daily();
        assert!(g.check_trade(&req(1, 100.0)).is_approved());
    }

    #[test]
    fn exposure_limit_uses_open_book() {
        let mut g = gate();
        for symbol in ["A", "B", "C", "D", "E"] {
            let r = TradeRequest {
                symbol,
                ..req(100, 99.0)
            };
            assert!(g.check_and_reserve(&r).is_approved());
        }
        let check = g.check_trade(&TradeRequest {
            symbol: "F",
            ..req(100, 99.0)
        });
        assert_eq!(check.decision, RiskDecision::RejectedExposure);
        g.record_trade("g1", "A", 10.0);
        assert!(g
            .check_trade(&TradeRequest {
                symbol: "F",
                ..req(100, 99.0)
            })
            .is_approved());
    }

    #[test]
    fn books_are_per_genome() {
        let mut g = gate();
        g.check_and_reserve(&req(1, 100.0));
        g.record_trade("g1", "RELIANCE", -2_500.0);
        assert_eq!(g.check_trade(&req(1, 100.0)).decision, RiskDecision::RejectedDailyLoss);
        let other = TradeRequest {
            genome_id: "g2",
            ..req(1, 100.0)
        };
        assert!(g.check_trade(&other).is_approved());
    }

    #[test]
    fn volatility_breaker_then_auto_kill() {
        let mut g = gate();
        g.update_volatility(3.5, 1.0);
        assert_eq!(g.check_trade(&req(1, 100.0)).decision, RiskDecision::RejectedVolatility);
        assert!(!g.is_kill_switch_active());
        g.update_volatility(5.0, 1.0);
        assert!(g.is_kill_switch_active());
    }

    #[test]
    fn large_combined_loss_trips_kill_switch() {
        let mut g = gate();
        g.check_and_reserve(&req(1, 100.0));
        g.record_trade("g1", "RELIANCE", -3_100.0);
        assert!(g.is_kill_switch_active());
        assert!(g.status().kill_switch_reason.is_some());
    }

    #[test]
    fn retain_books_drops_retired_genomes() {
        let mut g = gate();
        g.check_and_reserve(&req(1, 100.0));
        g.check_and_reserve(&TradeRequest {
            genome_id: "g2",
            ..req(1, 100.0)
        });
        g.retain_books(&["g2"]);
        assert!(g.book("g1").is_none());
        assert!(g.book("g2").is_some());
    }

    #[test]
    fn book_status_reports_remaining_budget() {
        let mut g = gate();
        g.check_and_reserve(&req(1, 100.0));
        g.record_trade("g1", "RELIANCE", -500.0);
        let status = g.book_status("g1");
        assert_eq!(status.daily_trades, 1);
        assert_eq!(status.trades_remaining, 49);
        assert!((status.loss_remaining - 1_500.0).abs() < 1e-9);
        assert!(status.can_trade);
    }

    #[test]
    fn check_trade_leaves_books_untouched() {
        let mut g = gate();
        assert!(g.check_trade(&req(2, 2450.0)).is_approved());
        assert!(g.book("g1").is_none());
        assert!(g.check_and_reserve(&req(2, 2450.0)).is_approved());
        let book = g.book("g1").unwrap();
        assert_eq!(book.daily_trades, 1);
        assert!((book.total_exposure() - 4_900.0).abs() < 1e-9);
    }

    #[test]
    fn released_reservation_frees_budget() {
        let mut g = gate();
        g.check_and_reserve(&req(2, 2450.0));
        g.release_reservation("g1", "RELIANCE");
        let status = g.book_status("g1");
        assert_eq!(status.daily_trades, 0);
        assert_eq!(status.total_exposure, 0.0);

        // nothing reserved for the symbol, nothing to undo
        g.check_and_reserve(&req(1, 100.0));
        g.release_reservation("g1", "TCS");
        assert_eq!(g.book_status("g1").daily_trades, 1);
    }
}
