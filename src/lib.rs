// IDR Pipeline - IDR warehouse to BFD PostgreSQL loader
// Copyright (c) 2025 BFD Pipeline Contributors
// Licensed under the MIT License

//! # IDR Pipeline
//!
//! Partitioned, checkpointed extract-load of Medicare beneficiary, claim and
//! provider records from the IDR warehouse into the BFD PostgreSQL database.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Describing** warehouse entities as metadata: fields, keys, cursor columns, partitions
//! - **Extracting** rows strictly after a persisted cursor, in cursor order
//! - **Loading** batches with `COPY` and an upsert, checkpointing in the same transaction
//! - **Orchestrating** four dependent stages over a bounded worker pool with retries
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Partitioning, extraction, loading, checkpoints and orchestration
//! - [`model`] - Entity descriptor trait and field metadata
//! - [`entities`] - The concrete IDR entities
//! - [`adapters`] - PostgreSQL and in-memory sources and destinations
//! - [`domain`] - Values, records and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use idr_pipeline::adapters::database::{create_destination_and_checkpoints, create_source_connector};
//! use idr_pipeline::config::load_config;
//! use idr_pipeline::core::orchestrate::{Coordinator, CoordinatorSettings};
//! use idr_pipeline::core::partition::LoadType;
//! use idr_pipeline::entities::default_registry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("idr-pipeline.toml")?;
//!     let (destination, checkpoints) = create_destination_and_checkpoints(&config)?;
//!
//!     let coordinator = Coordinator::new(
//!         default_registry()?,
//!         create_source_connector(&config)?,
//!         destination,
//!         checkpoints,
//!         CoordinatorSettings::from_config(&config)?,
//!     );
//!
//!     let summary = coordinator.run(LoadType::Initial).await?;
//!     println!("Loaded {} of {} tasks", summary.tasks_loaded(), summary.total_tasks());
//!     Ok(())
//! }
//! ```
//!
//! ## Incremental Loads
//!
//! Every `(table, partition)` pair keeps a checkpoint holding the cursor of
//! its last committed row. A row's cursor is the greatest of its batch and
//! update timestamps, tie-broken by its batch id, so a re-run extracts only
//! rows strictly after the checkpoint:
//!
//! ```rust
//! use idr_pipeline::core::state::Checkpoint;
//! use idr_pipeline::domain::Cursor;
//! use chrono::{TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
//! let last = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
//! let checkpoint = Checkpoint::new("idr.claim", "part_b", now, now)
//!     .advanced_to(Cursor::new(last, 10), now);
//!
//! assert!(checkpoint.is_new(&Cursor::new(last, 11)));
//! assert!(!checkpoint.is_new(&Cursor::new(last, 10)));
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`], with
//! [`domain::PipelineError`] as the error. Warehouse failures carry a
//! [`domain::SourceError`] whose class decides whether the retry policy
//! reconnects or fails the task.
//!
//! ## Logging
//!
//! The pipeline logs structured events with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!(table = "idr.claim", partition = "part_b", "Starting task");
//! warn!(attempt = 1, "Retrying after transient warehouse error");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod entities;
pub mod logging;
pub mod model;
