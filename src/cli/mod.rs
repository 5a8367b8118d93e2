//! CLI interface and argument parsing
//!
//! This module provides the command-line interface using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// IDR Pipeline - IDR warehouse to BFD loader
#[derive(Parser, Debug)]
#[command(name = "idr-pipeline")]
#[command(version, about, long_about = None)]
#[command(author = "BFD Pipeline Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "idr-pipeline.toml", env = "IDR_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "IDR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the warehouse into the BFD database
    Load(commands::load::LoadArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show checkpoints per table partition
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
