//! coldvault operator CLI
//!
//! Thin surface over the backup engine: manual backup and replication
//! triggers, snapshot listing, health reporting, an interactive restore
//! walk, and a long-running scheduler mode.

pub mod cli;
pub mod commands;
pub mod config;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;

/// CLI result type.
pub type Result<T> = anyhow::Result<T>;
