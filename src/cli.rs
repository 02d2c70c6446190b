//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvEventAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::validate_engine_config;
use crate::domain::engine::{Engine, RunSummary};
use crate::domain::error::EngineError;
use crate::domain::metrics::performance_summary;
use crate::domain::settings::EngineSettings;
use crate::ports::event_port::EventPort;

#[derive(Parser, Debug)]
#[command(name = "evotrader", about = "Evolutionary spread strategy paper trader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay recorded events through the engine
    Run {
        #[arg(short, long)]
        events: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate an engine configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols present in an event file
    ListSymbols {
        #[arg(short, long)]
        events: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            events,
            config,
            symbol,
            seed,
        } => run_replay(&events, config.as_deref(), symbol.as_deref(), seed),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { events } => run_list_symbols(&events),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = EngineError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Settings from an optional config file, with a CLI seed taking precedence.
pub fn build_settings(
    config_path: Option<&Path>,
    seed: Option<u64>,
) -> Result<EngineSettings, ExitCode> {
    let mut settings = match config_path {
        Some(path) => {
            let adapter = load_config(path)?;
            EngineSettings::from_port(&adapter).map_err(|e| {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            })?
        }
        None => EngineSettings::default(),
    };
    if seed.is_some() {
        settings.seed = seed;
    }
    Ok(settings)
}

/// Loads events from `port`, replays them and closes the final day.
pub fn run_pipeline(
    settings: EngineSettings,
    port: &dyn EventPort,
    symbol: Option<&str>,
) -> Result<(Engine, RunSummary), EngineError> {
    let events = port.fetch_events(symbol)?;
    if events.is_empty() {
        return Err(EngineError::NoEvents {
            symbol: symbol.unwrap_or("any symbol").to_string(),
        });
    }

    let mut engine = Engine::new(settings);
    let summary = engine.run(&events);
    engine.finish();
    tracing::info!(
        events = summary.events,
        discarded = summary.discarded,
        entries = summary.entries,
        exits = summary.exits,
        "replay complete"
    );
    Ok((engine, summary))
}

/// Human-readable end-of-run report.
pub fn render_report(engine: &Engine, summary: &RunSummary) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "Events: {} ({} discarded), entries: {}, exits: {}, risk rejections: {}",
        summary.events, summary.discarded, summary.entries, summary.exits, summary.rejections
    ));
    out.push(format!("Trading days: {}", engine.trading_days()));
    out.push(String::new());
    out.push(performance_summary(&engine.leaderboard()));
    out.push(String::new());

    let status = engine.champion_status();
    match (&status.champion_id, &status.champion_name) {
        (Some(id), Some(name)) => out.push(format!("Champion: {} [{}]", name, id)),
        (Some(id), None) => out.push(format!("Champion: {}", id)),
        _ => out.push("Champion: none".to_string()),
    }
    out.push(format!(
        "Main portfolio: {:.2} (P&L {:+.2}, {:+.2}%)",
        status.portfolio_value, status.portfolio_pnl, status.portfolio_pnl_pct
    ));
    if !status.previous_champions.is_empty() {
        out.push(format!(
            "Previous champions: {}",
            status.previous_champions.join(", ")
        ));
    }
    for c in &status.candidates {
        out.push(format!(
            "  candidate {}: {} days, +{:.2}",
            c.genome_id, c.days_outperforming, c.total_outperformance
        ));
    }
    if let Some(genome) = engine.champion_genome() {
        out.push(String::new());
        out.push(genome.summary());
        let book = engine.risk_book(genome.id());
        out.push(format!(
            "Champion risk book: {} trades today ({} left), loss budget {:.2}, exposure {:.2}",
            book.daily_trades, book.trades_remaining, book.loss_remaining, book.total_exposure
        ));
    }

    let risk = engine.risk_status();
    if risk.kill_switch_active {
        out.push(format!(
            "Kill switch ACTIVE: {}",
            risk.kill_switch_reason.unwrap_or_default()
        ));
    }

    out.push(String::new());
    if let Some(regime) = engine.regime() {
        let verdict = if engine.is_market_favorable() {
            "favorable"
        } else {
            "unfavorable"
        };
        out.push(format!("Market: {} ({})", regime, verdict));
    }
    for stats in engine.spread_statistics() {
        out.push(format!(
            "  {}: spread {:.4}% (avg {:.4}%, sd {:.4}%), today {:.4}%..{:.4}%, {} signals",
            stats.symbol,
            stats.current_spread,
            stats.avg_spread,
            stats.std_spread,
            stats.min_spread_today,
            stats.max_spread_today,
            stats.signals_today
        ));
    }
    let actionable: Vec<&str> = engine
        .actionable_signals()
        .into_iter()
        .map(|s| s.symbol.as_str())
        .collect();
    if !actionable.is_empty() {
        out.push(format!("Actionable at close: {}", actionable.join(", ")));
    }
    out.push(String::new());
    out.push(engine.generator().evolution_summary());
    out.join("\n")
}

fn run_replay(
    events_path: &Path,
    config_path: Option<&Path>,
    symbol: Option<&str>,
    seed: Option<u64>,
) -> ExitCode {
    let settings = match build_settings(config_path, seed) {
        Ok(s) => s,
        Err(code) => return code,
    };
    eprintln!("Replaying events from {}", events_path.display());

    let adapter = CsvEventAdapter::new(events_path.to_path_buf());
    match run_pipeline(settings, &adapter, symbol) {
        Ok((engine, summary)) => {
            eprintln!("{}", render_report(&engine, &summary));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_engine_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let settings = match EngineSettings::from_port(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nEngine:");
    eprintln!("  initial_capital:   {:.2}", settings.initial_capital);
    eprintln!("  population_size:   {}", settings.evolution.population_size);
    eprintln!("  evolve_every_days: {}", settings.evolve_every_days);
    match settings.seed {
        Some(seed) => eprintln!("  seed:              {}", seed),
        None => eprintln!("  seed:              (entropy)"),
    }
    eprintln!("\nRisk:");
    eprintln!("  max_daily_loss_pct:    {}", settings.risk.max_daily_loss_pct);
    eprintln!("  max_trades_per_day:    {}", settings.risk.max_trades_per_day);
    eprintln!("  max_position_size_pct: {}", settings.risk.max_position_size_pct);
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(events_path: &Path) -> ExitCode {
    let adapter = CsvEventAdapter::new(events_path.to_path_buf());
    match adapter.list_symbols() {
        Ok(symbols) if symbols.is_empty() => {
            eprintln!("No symbols found in {}", events_path.display());
            ExitCode::SUCCESS
        }
        Ok(symbols) => {
            for symbol in &symbols {
                println!("{}", symbol);
            }
            eprintln!("{} symbols found", symbols.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
