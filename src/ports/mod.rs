//! Port traits for the engine's external collaborators.

pub mod config_port;
pub mod event_port;
