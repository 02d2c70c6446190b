//! The evolution engine: owns every component and drives them from a
//! single stream of price events.
//!
//! Events are processed strictly in order. When an event's date moves past
//! the current simulated day, the day is closed first: daily performance is
//! recorded, promotions are evaluated, daily counters reset, and every
//! `evolve_every_days` closed days the population evolves.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::champion::{ChampionManager, ChampionStatus, PromotionCandidate};
use super::generator::{EvolutionRecord, Generator, population_diversity};
use super::genome::Genome;
use super::market::{MarketRegime, PriceEvent, SpreadSignal};
use super::metrics::{Evaluator, RankedStrategy};
use super::regime::{RegimeAnalyzer, is_favorable_for_trading};
use super::risk::{BookStatus, RiskGate, RiskStatus, SharedRiskGate};
use super::settings::EngineSettings;
use super::simulator::{Simulator, TickReport};
use super::spread_analyzer::{SpreadAnalyzer, SpreadStatistics};
use super::strategy_state::StrategyState;

/// Mean pairwise genome distance below which evolution injects random
/// genomes.
pub const DIVERSITY_FLOOR: f64 = 0.15;

/// Counters over a batch of processed events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub events: usize,
    pub discarded: usize,
    pub entries: usize,
    pub exits: usize,
    pub rejections: usize,
    pub days_closed: u32,
}

pub struct Engine {
    settings: EngineSettings,
    rng: ChaCha8Rng,
    risk: SharedRiskGate,
    simulator: Simulator,
    evaluator: Evaluator,
    generator: Generator,
    champion: ChampionManager,
    spreads: SpreadAnalyzer,
    regimes: RegimeAnalyzer,
    current_date: Option<NaiveDate>,
    trading_days: u32,
    days_since_evolution: u32,
}

impl Engine {
    /// Builds every component from `settings` and seeds the initial
    /// population. The first preset becomes the champion.
    pub fn new(settings: EngineSettings) -> Self {
        let mut rng = match settings.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let risk = RiskGate::new(settings.risk.clone(), settings.initial_capital).shared();
        let mut generator = Generator::new(settings.evolution.clone());
        let population = generator.create_initial_population(&mut rng);

        let mut champion = ChampionManager::new(settings.champion.clone(), settings.initial_capital);
        if let Some(first) = population.first() {
            champion.set_champion(first.id());
        }

        let mut simulator = Simulator::new(risk.clone(), settings.initial_capital);
        simulator.load_population(population);

        Engine {
            evaluator: Evaluator::new(settings.weights.clone(), settings.risk_free_rate),
            spreads: SpreadAnalyzer::new(settings.signal.clone()),
            regimes: RegimeAnalyzer::new(),
            rng,
            risk,
            simulator,
            generator,
            champion,
            settings,
            current_date: None,
            trading_days: 0,
            days_since_evolution: 0,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Feeds one event through regime detection, the spread analyzer and
    /// the simulator, closing the previous day first when the date moved on.
    pub fn process_event(&mut self, event: &PriceEvent) -> TickReport {
        if let Err(rejection) = event.validate() {
            tracing::warn!(symbol = %event.symbol, %rejection, "discarding malformed event");
            return TickReport::default();
        }
        self.step(event)
    }

    fn step(&mut self, event: &PriceEvent) -> TickReport {
        let date = event.timestamp.date();
        match self.current_date {
            None => self.current_date = Some(date),
            Some(current) if date > current => {
                self.roll_day(current);
                self.current_date = Some(date);
            }
            Some(current) if date < current => {
                tracing::debug!(%date, %current, "event older than current day");
            }
            Some(_) => {}
        }

        self.regimes.add_event(event);
        let regime = self.regimes.regime();
        self.risk
            .lock()
            .update_volatility(regime.volatility_value, self.regimes.average_volatility());
        self.simulator.set_regime(regime);

        let signal = self.spreads.add_event(event);
        self.simulator.on_event(event, Some(&signal))
    }

    /// Processes `events` in order and tallies what happened.
    pub fn run<'a>(&mut self, events: impl IntoIterator<Item = &'a PriceEvent>) -> RunSummary {
        let mut summary = RunSummary::default();
        let days_before = self.trading_days;
        for event in events {
            summary.events += 1;
            if let Err(rejection) = event.validate() {
                tracing::warn!(symbol = %event.symbol, %rejection, "discarding malformed event");
                summary.discarded += 1;
                continue;
            }
            let report = self.step(event);
            summary.entries += report.opened.len();
            summary.exits += report.closed.len();
            summary.rejections += report.rejected.len();
        }
        summary.days_closed = self.trading_days - days_before;
        summary
    }

    fn roll_day(&mut self, finished: NaiveDate) {
        self.trading_days += 1;
        self.close_day(finished);

        self.simulator.reset_daily();
        self.risk.lock().reset_daily();
        self.spreads.reset_daily();

        self.days_since_evolution += 1;
        if self.days_since_evolution >= self.settings.evolve_every_days.max(1) {
            self.days_since_evolution = 0;
            self.evolve();
        }
    }

    fn close_day(&mut self, date: NaiveDate) {
        let states = self.simulator.states();
        self.champion.record_daily_performance(date, states);
        if let Some(promoted) = self.champion.evaluate_promotions(states) {
            tracing::info!(champion = %promoted, %date, "champion replaced");
        }
        tracing::info!(%date, trading_days = self.trading_days, "day closed");
    }

    /// Ranks the population, evolves it and switches the simulator over.
    /// Survivors keep their state; retired genomes lose their risk books
    /// and daily records. A retired champion is replaced by the best
    /// survivor.
    pub fn evolve(&mut self) -> Option<&EvolutionRecord> {
        let ranked = self
            .evaluator
            .rank_strategies(self.simulator.states(), self.trading_days.max(1));
        tracing::debug!("\n{}", super::metrics::performance_summary(&ranked));

        let mut population = self.generator.evolve(&ranked, &mut self.rng);
        let diversity = population_diversity(&population);
        if population.len() > 2 && diversity < DIVERSITY_FLOOR {
            let count = (population.len() / 4).max(1);
            tracing::warn!(diversity, count, "population diversity low");
            population = self
                .generator
                .introduce_diversity(population, count, &mut self.rng);
        }

        let ids: Vec<String> = population.iter().map(|g| g.id().to_string()).collect();
        let active: Vec<&str> = ids.iter().map(String::as_str).collect();
        let best = ids.first().cloned();

        self.simulator.apply_population(population);
        self.risk.lock().retain_books(&active);
        self.champion.retain(&active);

        let champion_survived = self
            .champion
            .champion_id()
            .is_some_and(|id| active.contains(&id));
        if !champion_survived {
            if let Some(best) = best {
                tracing::info!(champion = %best, "champion retired, best survivor takes over");
                self.champion.set_champion(best);
            }
        }
        self.generator.history().last()
    }

    /// Closes the last open day without evolving.
    pub fn finish(&mut self) {
        if let Some(date) = self.current_date.take() {
            self.trading_days += 1;
            self.close_day(date);
        }
    }

    pub fn trading_days(&self) -> u32 {
        self.trading_days
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    pub fn states(&self) -> &[StrategyState] {
        self.simulator.states()
    }

    pub fn state(&self, genome_id: &str) -> Option<&StrategyState> {
        self.simulator.state(genome_id)
    }

    /// Current population ranked best first.
    pub fn leaderboard(&self) -> Vec<RankedStrategy> {
        self.evaluator
            .rank_strategies(self.simulator.states(), self.trading_days.max(1))
    }

    pub fn evolution_history(&self) -> &[EvolutionRecord] {
        self.generator.history()
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn lineage(&self, genome_id: &str) -> Vec<String> {
        self.generator.lineage(genome_id)
    }

    pub fn champion_id(&self) -> Option<&str> {
        self.champion.champion_id()
    }

    pub fn champion_status(&self) -> ChampionStatus {
        self.champion.status(self.simulator.states())
    }

    pub fn promotion_candidates(&self) -> Vec<PromotionCandidate> {
        self.champion.candidates()
    }

    pub fn risk_status(&self) -> RiskStatus {
        self.risk.lock().status()
    }

    pub fn regime(&self) -> Option<&MarketRegime> {
        self.regimes.current()
    }

    /// False until a regime has been observed.
    pub fn is_market_favorable(&self) -> bool {
        self.regimes.current().is_some_and(is_favorable_for_trading)
    }

    pub fn signal(&self, symbol: &str) -> Option<&SpreadSignal> {
        self.spreads.signal(symbol)
    }

    pub fn actionable_signals(&self) -> Vec<&SpreadSignal> {
        self.spreads.actionable_signals()
    }

    pub fn spread_statistics(&self) -> Vec<SpreadStatistics> {
        self.spreads.all_statistics()
    }

    /// The champion's genome, if it is still in the population.
    pub fn champion_genome(&self) -> Option<&Genome> {
        let id = self.champion.champion_id()?;
        self.simulator.state(id).map(StrategyState::genome)
    }

    pub fn risk_book(&self, genome_id: &str) -> BookStatus {
        self.risk.lock().book_status(genome_id)
    }

    /// Manual champion override. Returns false for an id outside the
    /// current population.
    pub fn set_champion(&mut self, genome_id: &str) -> bool {
        if self.simulator.state(genome_id).is_none() {
            tracing::warn!(genome_id, "cannot set unknown genome as champion");
            return false;
        }
        self.champion.set_champion(genome_id);
        true
    }

    pub fn activate_kill_switch(&self, reason: &str) {
        self.risk.lock().activate_kill_switch(reason);
    }

    pub fn deactivate_kill_switch(&self) {
        self.risk.lock().deactivate_kill_switch();
    }

    pub fn is_kill_switch_active(&self) -> bool {
        self.risk.lock().is_kill_switch_active()
    }
}
