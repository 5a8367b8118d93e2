//! External system integrations.
//!
//! - [`database`] - Source, destination and checkpoint traits plus the factory
//! - [`postgresql`] - Warehouse cursor source and BFD PostgreSQL destination
//! - [`memory`] - In-memory warehouse and store for dry runs and tests
//!
//! # Design Pattern
//!
//! Adapters isolate the database drivers behind the traits in
//! [`database::traits`], so the orchestration layer runs unchanged against
//! PostgreSQL or the in-memory implementations.
//!
//! ```rust,no_run
//! use idr_pipeline::adapters::database::create_destination_and_checkpoints;
//! use idr_pipeline::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("idr-pipeline.toml")?;
//! let (destination, _checkpoints) = create_destination_and_checkpoints(&config)?;
//! destination.test_connection().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod memory;
pub mod postgresql;
