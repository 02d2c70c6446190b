//! Core domain types and logic: genomes, simulation, risk, scoring,
//! evolution and champion selection.

pub mod market;
pub mod genome;
pub mod position;
pub mod strategy_state;
pub mod risk;
pub mod spread_analyzer;
pub mod regime;
pub mod simulator;
pub mod metrics;
pub mod generator;
pub mod champion;
pub mod settings;
pub mod config_validation;
pub mod engine;
pub mod error;
