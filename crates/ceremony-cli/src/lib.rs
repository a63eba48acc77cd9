//! Ceremony CLI - In-process ceremony runner
//!
//! Resolves the harness configuration, spawns one orchestrator per instance
//! over the simulated collaborators and exports metrics while they run.

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands, RunArgs};
pub use runner::{HarnessRunner, RunSummary};
