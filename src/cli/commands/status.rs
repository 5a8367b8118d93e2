//! Status command implementation
//!
//! This module implements the `status` command, which lists the persisted
//! checkpoints per table partition.

use crate::adapters::database::create_checkpoint_store;
use crate::config::load_config;
use crate::core::state::{Checkpoint, CheckpointManager};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show checkpoints of this table (e.g. idr.claim)
    #[arg(long)]
    pub table: Option<String>,

    /// Only show checkpoints of this partition
    #[arg(long)]
    pub partition: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking load status");

        println!("📊 Load Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {}", e);
                return Ok(2);
            }
        };

        let store = match create_checkpoint_store(&config) {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {}", e);
                return Ok(4);
            }
        };

        let checkpoints = match CheckpointManager::new_with_store(store).list().await {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load checkpoints");
                println!("   Error: {}", e);
                return Ok(5);
            }
        };

        if checkpoints.is_empty() {
            println!("No load history found.");
            println!("Run 'idr-pipeline load --load-type initial' to start loading data.");
            return Ok(0);
        }

        let filtered = self.filter(&checkpoints);
        if filtered.is_empty() {
            println!("No checkpoints match the specified filters.");
            return Ok(0);
        }

        println!("Found {} checkpoint(s):", filtered.len());
        println!();
        println!(
            "{:<36} {:<28} {:<22} {:<14} {:<22}",
            "Table", "Partition", "Last Timestamp", "Last Id", "Last Commit"
        );
        println!("{}", "-".repeat(124));

        for checkpoint in filtered {
            println!(
                "{:<36} {:<28} {:<22} {:<14} {:<22}",
                checkpoint.table_name,
                if checkpoint.batch_partition.is_empty() {
                    "-"
                } else {
                    checkpoint.batch_partition.as_str()
                },
                checkpoint.last_ts.format("%Y-%m-%d %H:%M:%S"),
                checkpoint.last_id,
                checkpoint.batch_complete_ts.format("%Y-%m-%d %H:%M:%S"),
            );
        }

        println!();
        Ok(0)
    }

    fn filter<'a>(&self, checkpoints: &'a [Checkpoint]) -> Vec<&'a Checkpoint> {
        checkpoints
            .iter()
            .filter(|c| self.table.as_deref().map_or(true, |t| c.table_name == t))
            .filter(|c| {
                self.partition
                    .as_deref()
                    .map_or(true, |p| c.batch_partition == p)
            })
            .collect()
    }
}
