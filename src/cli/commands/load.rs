//! Load command implementation
//!
//! This module implements the `load` command, which runs the staged
//! extract-load from the warehouse into the BFD database.

use crate::adapters::database::{create_destination_and_checkpoints, create_source_connector};
use crate::config::loader::parse_mode;
use crate::config::{load_config, LoadMode};
use crate::core::orchestrate::{Coordinator, CoordinatorSettings};
use crate::core::partition::LoadType;
use crate::domain::PipelineError;
use crate::entities::default_registry;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the load command
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Initial loads backfill history in date-bounded partitions
    #[arg(long, value_enum, default_value_t = LoadType::Incremental, env = "IDR_LOAD_TYPE")]
    pub load_type: LoadType,

    /// Read from the warehouse but keep every write in memory
    #[arg(long)]
    pub dry_run: bool,

    /// Override the load mode (production, synthetic, local)
    #[arg(long)]
    pub mode: Option<String>,

    /// Override the number of concurrent workers
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Override the rows committed per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Fix the task shuffle seed to reproduce a run's ordering
    #[arg(long)]
    pub seed: Option<u64>,
}

impl LoadArgs {
    /// Execute the load command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(load_type = %self.load_type, "Starting load command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        // Apply CLI overrides
        if let Some(mode) = &self.mode {
            match parse_mode(mode) {
                Ok(mode) => {
                    tracing::info!(mode = %mode, "Overriding load mode from CLI");
                    config.application.mode = mode;
                }
                Err(e) => {
                    eprintln!("{e}");
                    return Ok(2);
                }
            }
        }
        if let Some(max_workers) = self.max_workers {
            config.pipeline.max_workers = max_workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.pipeline.shuffle_seed = Some(seed);
        }
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let settings = match CoordinatorSettings::from_config(&config) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Configuration validation failed: {e}");
                return Ok(2);
            }
        };
        let registry = match default_registry() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Invalid entity definitions");
                eprintln!("Invalid entity definitions: {e}");
                return Ok(5);
            }
        };

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - rows and checkpoints are kept in memory only");
            println!();
        }
        if config.application.mode != LoadMode::Production && !config.checkpoints_enabled() {
            tracing::info!(mode = %config.application.mode, "Checkpoints disabled for this mode");
        }

        let connector = match create_source_connector(&config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to initialize warehouse connector: {e}");
                return Ok(4);
            }
        };
        let (destination, checkpoints) = match create_destination_and_checkpoints(&config) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Failed to initialize destination: {e}");
                return Ok(4);
            }
        };
        if let Err(e) = destination.test_connection().await {
            tracing::error!(error = %e, "Destination connection test failed");
            eprintln!("Failed to connect to destination: {e}");
            return Ok(4);
        }

        let coordinator = Coordinator::new(registry, connector, destination, checkpoints, settings)
            .with_shutdown(shutdown_signal);

        println!("🚀 Starting {} load...", self.load_type);
        println!();

        let summary = match coordinator.run(self.load_type).await {
            Ok(s) => s,
            Err(PipelineError::Interrupted(reason)) => {
                tracing::info!(reason = %reason, "Load interrupted by user signal");
                println!();
                println!("⚠️  Load interrupted. Committed batches are checkpointed.");
                println!("   Run the same command to resume.");
                return Ok(130);
            }
            Err(e) => {
                tracing::error!(error = %e, "Load failed");
                eprintln!("Load failed: {e}");
                return Ok(5);
            }
        };

        println!("📊 Load Summary:");
        println!("  Load type: {}", summary.load_type);
        println!("  Seed: {}", summary.seed);
        for stage in &summary.stages {
            println!(
                "  {}: {} task(s), {} with new rows, {:.2}s",
                stage.stage,
                stage.tasks,
                stage.tasks_loaded,
                stage.duration.as_secs_f64()
            );
        }
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
        println!();
        println!("✅ Load completed successfully!");

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: LoadArgs,
    }

    #[test]
    fn test_load_args_defaults() {
        let args = Wrapper::parse_from(["load"]).args;
        assert_eq!(args.load_type, LoadType::Incremental);
        assert!(!args.dry_run);
        assert!(args.seed.is_none());
    }

    #[test]
    fn test_load_args_with_overrides() {
        let args = Wrapper::parse_from([
            "load",
            "--load-type",
            "initial",
            "--dry-run",
            "--max-workers",
            "2",
            "--seed",
            "42",
        ])
        .args;
        assert_eq!(args.load_type, LoadType::Initial);
        assert!(args.dry_run);
        assert_eq!(args.max_workers, Some(2));
        assert_eq!(args.seed, Some(42));
    }

    #[tokio::test]
    async fn test_missing_config_is_a_configuration_error() {
        let args = Wrapper::parse_from(["load"]).args;
        let (_tx, rx) = watch::channel(false);
        let code = args
            .execute("/nonexistent/idr-pipeline.toml", rx)
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
