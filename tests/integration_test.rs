//! End-to-end behaviour of the simulation and evolution engine through the
//! public API.

mod common;

use approx::assert_relative_eq;
use common::*;
use evotrader::domain::engine::Engine;
use evotrader::domain::generator::{EvolutionConfig, Generator};
use evotrader::domain::genome::Genome;
use evotrader::domain::market::Leg;
use evotrader::domain::metrics::Evaluator;
use evotrader::domain::position::ExitReason;
use evotrader::domain::risk::{RiskConfig, RiskDecision, RiskGate, TradeRequest};
use evotrader::domain::settings::EngineSettings;
use evotrader::domain::spread_analyzer::SpreadAnalyzer;
use evotrader::domain::strategy_state::StrategyState;

fn scenario_genome(id: &str) -> Genome {
    Genome::builder()
        .id(id)
        .min_spread_threshold(0.05)
        .stability_ticks(3)
        .latency_buffer_pct(0.01)
        .position_size_pct(5.0)
        .take_profit_pct(0.10)
        .stop_loss_pct(0.20)
        .max_hold_secs(120)
        .build(&mut rng(1))
}

mod simulator {
    use super::*;

    #[test]
    fn entry_fires_only_on_fifth_tick() {
        let mut sim = simulator_with(vec![scenario_genome("g1")], 100_000.0);
        let ticks = [(0.03, 1), (0.03, 2), (0.06, 1), (0.06, 2), (0.06, 3)];
        let mut opened_at = Vec::new();
        for (i, (spread, stable)) in ticks.into_iter().enumerate() {
            let at = ts(4, 10, 0, i as u32);
            let event = quote("RELIANCE", at, 2450.0, 2451.5);
            let report = sim.on_event(&event, Some(&actionable_signal("RELIANCE", at, spread, stable)));
            if !report.opened.is_empty() {
                opened_at.push(i);
            }
        }
        assert_eq!(opened_at, vec![4]);
    }

    #[test]
    fn take_profit_on_exit_leg() {
        let genome = Genome::builder()
            .id("tp")
            .min_spread_threshold(0.05)
            .stability_ticks(1)
            .latency_buffer_pct(0.01)
            .position_size_pct(2.0)
            .take_profit_pct(0.10)
            .stop_loss_pct(0.20)
            .max_hold_secs(120)
            .build(&mut rng(2));
        // 2% of 1,225,000 buys exactly 10 units at 2450
        let mut sim = simulator_with(vec![genome], 1_225_000.0);

        let t0 = ts(4, 10, 0, 0);
        let report = sim.on_event(
            &quote("RELIANCE", t0, 2450.0, 2450.5),
            Some(&actionable_signal("RELIANCE", t0, 0.08, 4)),
        );
        assert_eq!(report.opened.len(), 1);
        assert_eq!(report.opened[0].leg, Leg::Primary);
        assert_eq!(report.opened[0].quantity, 10);

        let t1 = ts(4, 10, 0, 5);
        let report = sim.on_event(&quote("RELIANCE", t1, 2450.0, 2452.5), None);
        assert_eq!(report.closed.len(), 1);
        let trade = &report.closed[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_relative_eq!(trade.pnl, 25.0, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl_pct, 0.10204, epsilon = 1e-4);
        assert_relative_eq!(
            trade.pnl_pct,
            trade.pnl / (trade.entry_price * trade.quantity as f64) * 100.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn time_exit_wins_over_price_exits() {
        let genome = Genome::builder()
            .id("slow")
            .stability_ticks(1)
            .min_spread_threshold(0.02)
            .latency_buffer_pct(0.01)
            .max_hold_secs(15)
            .build(&mut rng(3));
        let mut sim = simulator_with(vec![genome], 100_000.0);
        let t0 = ts(4, 10, 0, 0);
        sim.on_event(
            &quote("TCS", t0, 3500.0, 3501.0),
            Some(&actionable_signal("TCS", t0, 0.05, 2)),
        );
        // far past take-profit, but also past the deadline
        let report = sim.on_event(&quote("TCS", ts(4, 10, 0, 20), 3500.0, 3600.0), None);
        assert_eq!(report.closed[0].exit_reason, ExitReason::TimeExit);
    }

    #[test]
    fn positions_are_independent_per_genome() {
        let a = scenario_genome("a");
        let b = Genome::builder()
            .id("b")
            .min_spread_threshold(0.20)
            .build(&mut rng(4));
        let mut sim = simulator_with(vec![a, b], 100_000.0);
        let at = ts(4, 10, 0, 0);
        sim.on_event(
            &quote("RELIANCE", at, 2450.0, 2451.5),
            Some(&actionable_signal("RELIANCE", at, 0.06, 5)),
        );
        assert_eq!(sim.state("a").unwrap().open_position_count(), 1);
        assert_eq!(sim.state("b").unwrap().open_position_count(), 0);
    }

    #[test]
    fn analyzer_signals_drive_entries_and_exits() {
        let mut analyzer = SpreadAnalyzer::default();
        let mut sim = simulator_with(vec![scenario_genome("g1")], 100_000.0);
        let mut entries = Vec::new();
        let mut closed = Vec::new();
        for (i, event) in spike_day("RELIANCE", 4).iter().enumerate() {
            let signal = analyzer.add_event(event);
            let report = sim.on_event(event, Some(&signal));
            if !report.opened.is_empty() {
                entries.push(i);
            }
            closed.extend(report.closed);
        }

        // the quiet 0.01% baseline never qualifies; the first spike tick does
        assert_eq!(entries.first(), Some(&40));
        assert!(entries.iter().all(|&i| (40..45).contains(&i)));

        let first = &closed[0];
        assert_eq!(first.exit_reason, ExitReason::TakeProfit);
        assert_eq!(first.entry_leg, Leg::Primary);
        assert_eq!(first.quantity, 50);
        assert_relative_eq!(first.pnl, 10.0, epsilon = 1e-6);
        assert!(closed.iter().all(|t| t.pnl > 0.0));
    }
}

mod risk {
    use super::*;

    #[test]
    fn oversized_trade_is_resized_not_rejected() {
        let gate = RiskGate::new(
            RiskConfig {
                max_position_size_pct: 10.0,
                ..RiskConfig::default()
            },
            100_000.0,
        );
        let check = gate.check_trade(&TradeRequest {
            genome_id: "g",
            symbol: "SBIN",
            quantity: 6,
            price: 2_500.0,
            current_capital: 100_000.0,
        });
        assert!(check.is_approved());
        assert_eq!(check.modified_quantity, Some(4));
        assert_eq!(check.final_quantity(6), 4);
    }

    #[test]
    fn kill_switch_blocks_until_deactivated() {
        let mut sim = simulator_with(vec![scenario_genome("g")], 100_000.0);
        let gate = shared_gate(100_000.0);
        gate.lock().activate_kill_switch("manual");
        let mut sim_gated = evotrader::domain::simulator::Simulator::new(gate.clone(), 100_000.0);
        sim_gated.load_population(vec![scenario_genome("g")]);

        let at = ts(4, 10, 0, 0);
        let event = quote("RELIANCE", at, 2450.0, 2451.5);
        let signal = actionable_signal("RELIANCE", at, 0.06, 5);

        let report = sim_gated.on_event(&event, Some(&signal));
        assert_eq!(report.rejected[0].decision, RiskDecision::RejectedKillSwitch);
        gate.lock().reset_daily();
        assert!(gate.lock().is_kill_switch_active());

        gate.lock().deactivate_kill_switch();
        let report = sim_gated.on_event(&event, Some(&signal));
        assert_eq!(report.opened.len(), 1);

        // an ungated simulator is unaffected by another gate's switch
        assert_eq!(sim.on_event(&event, Some(&signal)).opened.len(), 1);
    }

    #[test]
    fn exposure_rule_fires_before_volatility_rule() {
        let mut gate = RiskGate::new(RiskConfig::default(), 100_000.0);
        let req = |genome_id| TradeRequest {
            genome_id,
            symbol: "INFY",
            quantity: 4,
            price: 2_450.0,
            current_capital: 100_000.0,
        };
        for _ in 0..5 {
            assert!(gate.check_and_reserve(&req("busy")).is_approved());
        }
        // 4x average: past the 3x breaker, short of the 4.5x auto-kill
        gate.update_volatility(4.0, 1.0);
        assert!(!gate.is_kill_switch_active());

        assert_eq!(gate.check_trade(&req("busy")).decision, RiskDecision::RejectedExposure);
        assert_eq!(gate.check_trade(&req("idle")).decision, RiskDecision::RejectedVolatility);
    }
}

mod evolution {
    use super::*;

    fn ranked_population(generator: &mut Generator, seed: u64) -> Vec<evotrader::domain::metrics::RankedStrategy> {
        let population = generator.create_initial_population(&mut rng(seed));
        let states: Vec<StrategyState> = population
            .into_iter()
            .map(|g| StrategyState::new(g, 10_000.0))
            .collect();
        Evaluator::default().rank_strategies(&states, 1)
    }

    #[test]
    fn empty_ranking_recovers_with_fresh_population() {
        let mut generator = Generator::new(EvolutionConfig {
            population_size: 6,
            ..EvolutionConfig::default()
        });
        let population = generator.evolve(&[], &mut rng(5));
        assert_eq!(population.len(), 6);
        assert!(population.iter().all(|g| g.generation() == 1));
        assert!(generator.history().is_empty());
    }

    #[test]
    fn evolve_keeps_size_and_retains_expected_count() {
        for size in [3usize, 4, 8, 13, 20] {
            let mut generator = Generator::new(EvolutionConfig {
                population_size: size,
                ..EvolutionConfig::default()
            });
            let ranked = ranked_population(&mut generator, size as u64);
            let next = generator.evolve(&ranked, &mut rng(99));
            assert_eq!(next.len(), size);

            let expected = ((size as f64 * 0.75).floor() as usize).max(2);
            let record = generator.history().last().unwrap();
            assert_eq!(record.strategies_before - record.retired_count, expected);
            let survivors = next
                .iter()
                .filter(|g| ranked.iter().any(|r| r.genome.id() == g.id()))
                .count();
            assert_eq!(survivors, expected);
        }
    }

    #[test]
    fn offspring_generation_follows_parents() {
        let mut generator = Generator::new(EvolutionConfig::default());
        let ranked = ranked_population(&mut generator, 7);
        let next = generator.evolve(&ranked, &mut rng(8));
        let by_id = |id: &str| ranked.iter().find(|r| r.genome.id() == id).map(|r| &r.genome);

        for child in next.iter().filter(|g| by_id(g.id()).is_none()) {
            let parents: Vec<&Genome> = child.parent_ids().into_iter().filter_map(by_id).collect();
            assert!(!parents.is_empty());
            let max_gen = parents.iter().map(|p| p.generation()).max().unwrap();
            assert_eq!(child.generation(), max_gen + 1);
        }
    }
}

mod engine {
    use super::*;

    fn settings(seed: u64) -> EngineSettings {
        EngineSettings {
            seed: Some(seed),
            ..EngineSettings::default()
        }
    }

    #[test]
    fn multi_day_replay_trades_and_evolves() {
        let events = spike_days("RELIANCE", 4..=8);
        let mut engine = Engine::new(settings(21));
        let summary = engine.run(&events);
        engine.finish();

        assert_eq!(summary.events, events.len());
        assert_eq!(summary.discarded, 0);
        assert_eq!(summary.days_closed, 4);
        assert_eq!(engine.evolution_history().len(), 4);
        assert_eq!(engine.states().len(), 8);
        assert!(summary.entries > 0, "no strategy entered on the spikes");

        let champion = engine.champion_id().unwrap();
        assert!(engine.state(champion).is_some());
        assert!(!engine.is_kill_switch_active());

        for state in engine.states() {
            assert!(state.open_position_count() <= 1);
            for trade in state.trades() {
                assert_relative_eq!(
                    trade.pnl_pct,
                    trade.pnl / (trade.entry_price * trade.quantity as f64) * 100.0,
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn seeded_replays_are_reproducible() {
        let events = spike_days("RELIANCE", 4..=6);
        let run = |seed| {
            let mut engine = Engine::new(settings(seed));
            engine.run(&events);
            engine.finish();
            engine
                .states()
                .iter()
                .map(|s| (s.genome_id().to_string(), s.total_trades(), s.total_pnl()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(33), run(33));
    }

    #[test]
    fn leaderboard_is_sorted_best_first() {
        let events = spike_days("RELIANCE", 4..=5);
        let mut engine = Engine::new(settings(44));
        engine.run(&events);
        let board = engine.leaderboard();
        assert_eq!(board.len(), 8);
        for pair in board.windows(2) {
            assert!(pair[0].metrics.composite_score >= pair[1].metrics.composite_score);
        }
    }

    #[test]
    fn kill_switch_stops_new_entries() {
        let events = spike_day("RELIANCE", 4);
        let mut engine = Engine::new(settings(55));
        engine.activate_kill_switch("halt");
        let summary = engine.run(&events);
        assert_eq!(summary.entries, 0);
        assert!(summary.rejections > 0);
        assert!(engine.is_kill_switch_active());
    }

    #[test]
    fn sustained_outperformance_promotes_challenger() {
        let mut engine = Engine::new(EngineSettings {
            evolve_every_days: 30,
            ..settings(77)
        });
        // the aggressive preset wants high volatility and never trades
        // these calm sessions
        let idle = engine.states()[1].genome_id().to_string();
        assert!(engine.set_champion(&idle));

        engine.run(&spike_days("RELIANCE", 4..=9));
        engine.finish();

        assert!(engine.evolution_history().is_empty());
        assert_eq!(engine.state(&idle).unwrap().total_trades(), 0);
        let champion = engine.champion_id().unwrap().to_string();
        assert_ne!(champion, idle);
        assert!(engine.state(&champion).unwrap().total_trades() >= 5);
        assert!(engine.champion_status().previous_champions.contains(&idle));
    }

    #[test]
    fn malformed_events_are_skipped() {
        let mut events = spike_day("RELIANCE", 4);
        events.insert(10, quote("RELIANCE", ts(4, 10, 0, 10), f64::NAN, 100.0));
        events.insert(20, quote("RELIANCE", ts(4, 10, 0, 20), 100.0, 0.0));
        let mut engine = Engine::new(settings(66));
        let summary = engine.run(&events);
        assert_eq!(summary.discarded, 2);
        assert_eq!(summary.events, events.len());
    }
}
