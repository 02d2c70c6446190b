//! Champion/challenger protocol.
//!
//! One genome at a time is the champion; the main simulated portfolio
//! follows its daily P&L. A challenger is promoted once it has beaten the
//! champion's trailing P&L for enough consecutive evaluations and also has
//! enough trades and a small enough drawdown.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::strategy_state::StrategyState;

#[derive(Debug, Clone, PartialEq)]
pub struct ChampionConfig {
    pub days_to_outperform: u32,
    pub min_trades: usize,
    pub max_drawdown: f64,
}

impl Default for ChampionConfig {
    fn default() -> Self {
        ChampionConfig {
            days_to_outperform: 3,
            min_trades: 5,
            max_drawdown: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailyPerformance {
    pub date: NaiveDate,
    pub genome_id: String,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub trade_count: u32,
    pub win_rate: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PromotionCandidate {
    pub genome_id: String,
    pub days_outperforming: u32,
    pub total_outperformance: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChampionStatus {
    pub champion_id: Option<String>,
    pub champion_name: Option<String>,
    pub portfolio_value: f64,
    pub portfolio_pnl: f64,
    pub portfolio_pnl_pct: f64,
    pub candidates: Vec<PromotionCandidate>,
    pub previous_champions: Vec<String>,
}

#[derive(Debug)]
pub struct ChampionManager {
    config: ChampionConfig,
    initial_capital: f64,
    champion_id: Option<String>,
    history: Vec<String>,
    candidates: HashMap<String, PromotionCandidate>,
    main_capital: f64,
    main_pnl: f64,
    daily_records: HashMap<String, Vec<DailyPerformance>>,
}

impl ChampionManager {
    pub fn new(config: ChampionConfig, initial_capital: f64) -> Self {
        ChampionManager {
            config,
            initial_capital,
            champion_id: None,
            history: Vec::new(),
            candidates: HashMap::new(),
            main_capital: initial_capital,
            main_pnl: 0.0,
            daily_records: HashMap::new(),
        }
    }

    pub fn champion_id(&self) -> Option<&str> {
        self.champion_id.as_deref()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn portfolio_value(&self) -> f64 {
        self.main_capital
    }

    pub fn portfolio_pnl(&self) -> f64 {
        self.main_pnl
    }

    pub fn portfolio_pnl_pct(&self) -> f64 {
        if self.initial_capital > 0.0 {
            self.main_pnl / self.initial_capital * 100.0
        } else {
            0.0
        }
    }

    pub fn daily_records(&self, genome_id: &str) -> &[DailyPerformance] {
        self.daily_records
            .get(genome_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Candidates sorted by genome id.
    pub fn candidates(&self) -> Vec<PromotionCandidate> {
        let mut list: Vec<PromotionCandidate> = self.candidates.values().cloned().collect();
        list.sort_by(|a, b| a.genome_id.cmp(&b.genome_id));
        list
    }

    /// Makes `genome_id` the champion. The previous champion, if any, goes
    /// onto the history list. The main portfolio keeps its capital and
    /// follows the new champion from the next recorded day.
    pub fn set_champion(&mut self, genome_id: impl Into<String>) {
        let genome_id = genome_id.into();
        if self.champion_id.as_deref() == Some(genome_id.as_str()) {
            return;
        }
        let previous = self.champion_id.replace(genome_id.clone());
        if let Some(prev) = &previous {
            self.history.push(prev.clone());
        }
        self.candidates.clear();
        tracing::info!(
            champion = %genome_id,
            replacing = previous.as_deref().unwrap_or("none"),
            "new champion"
        );
    }

    /// Appends one record per strategy for `date` and moves the main
    /// portfolio by the champion's day.
    pub fn record_daily_performance(&mut self, date: NaiveDate, states: &[StrategyState]) {
        for state in states {
            let record = DailyPerformance {
                date,
                genome_id: state.genome_id().to_string(),
                pnl: state.daily_pnl(),
                pnl_pct: if state.initial_capital() > 0.0 {
                    state.daily_pnl() / state.initial_capital() * 100.0
                } else {
                    0.0
                },
                trade_count: state.daily_trades(),
                win_rate: state.win_rate(),
                max_drawdown: state.max_drawdown(),
            };
            self.daily_records
                .entry(record.genome_id.clone())
                .or_default()
                .push(record);
        }

        if let Some(champion) = self
            .champion_id
            .as_deref()
            .and_then(|id| states.iter().find(|s| s.genome_id() == id))
        {
            self.main_pnl += champion.daily_pnl();
            self.main_capital = self.initial_capital + self.main_pnl;
        }
        tracing::info!(strategies = states.len(), %date, "recorded daily performance");
    }

    fn trailing_pnl(&self, genome_id: &str) -> Option<f64> {
        let records = self.daily_records.get(genome_id)?;
        let window = self.config.days_to_outperform as usize;
        let start = records.len().saturating_sub(window);
        Some(records[start..].iter().map(|r| r.pnl).sum())
    }

    fn meets_promotion_criteria(&self, state: &StrategyState, candidate: &PromotionCandidate) -> bool {
        if candidate.days_outperforming < self.config.days_to_outperform {
            return false;
        }
        if state.total_trades() < self.config.min_trades {
            tracing::debug!(
                strategy = state.genome().name(),
                trades = state.total_trades(),
                "needs more trades for promotion"
            );
            return false;
        }
        if state.max_drawdown() > self.config.max_drawdown {
            tracing::debug!(
                strategy = state.genome().name(),
                drawdown = state.max_drawdown(),
                "drawdown too high for promotion"
            );
            return false;
        }
        true
    }

    /// Compares every challenger's trailing P&L to the champion's and
    /// promotes the first one that qualifies. Returns the new champion id.
    pub fn evaluate_promotions(&mut self, states: &[StrategyState]) -> Option<String> {
        let Some(champion_id) = self.champion_id.clone() else {
            tracing::warn!("no champion set, cannot evaluate promotions");
            return None;
        };
        let champion_pnl = self.trailing_pnl(&champion_id)?;
        let window = self.config.days_to_outperform as usize;

        for state in states {
            let id = state.genome_id();
            if id == champion_id {
                continue;
            }
            if self.daily_records(id).len() < window {
                continue;
            }
            let Some(challenger_pnl) = self.trailing_pnl(id) else {
                continue;
            };

            if challenger_pnl > champion_pnl {
                let edge = challenger_pnl - champion_pnl;
                let candidate = self
                    .candidates
                    .entry(id.to_string())
                    .and_modify(|c| {
                        c.days_outperforming += 1;
                        c.total_outperformance += edge;
                    })
                    .or_insert_with(|| PromotionCandidate {
                        genome_id: id.to_string(),
                        days_outperforming: 1,
                        total_outperformance: edge,
                    })
                    .clone();

                if self.meets_promotion_criteria(state, &candidate) {
                    tracing::info!(
                        strategy = state.genome().name(),
                        replaces = %champion_id,
                        days = candidate.days_outperforming,
                        "promotion"
                    );
                    self.set_champion(id);
                    return Some(id.to_string());
                }
            } else {
                self.candidates.remove(id);
            }
        }
        None
    }

    /// Forgets candidates and records of genomes no longer simulated.
    pub fn retain(&mut self, active: &[&str]) {
        self.candidates.retain(|id, _| active.contains(&id.as_str()));
        self.daily_records.retain(|id, _| active.contains(&id.as_str()));
    }

    pub fn status(&self, states: &[StrategyState]) -> ChampionStatus {
        let champion_name = self.champion_id.as_deref().and_then(|id| {
            states
                .iter()
                .find(|s| s.genome_id() == id)
                .map(|s| s.genome().name().to_string())
        });
        ChampionStatus {
            champion_id: self.champion_id.clone(),
            champion_name,
            portfolio_value: self.main_capital,
            portfolio_pnl: self.main_pnl,
            portfolio_pnl_pct: self.portfolio_pnl_pct(),
            candidates: self.candidates(),
            previous_champions: self.history.clone(),
        }
    }
}
