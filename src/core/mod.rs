//! Core load logic.
//!
//! # Modules
//!
//! - [`partition`] - Partition groups and date-range expansion
//! - [`extract`] - Query rendering and streaming extraction
//! - [`load`] - Batched merge into the destination
//! - [`state`] - Checkpoints for incremental resumption
//! - [`retry`] - Transient error budget and reconnects
//! - [`orchestrate`] - Stage planning, worker pool and the run coordinator
//!
//! # Load Workflow
//!
//! 1. **Plan**: Expand every entity of a stage into partition tasks
//! 2. **Resume**: Read the task's checkpoint
//! 3. **Extract**: Stream rows strictly after the checkpoint, cursor-ordered
//! 4. **Load**: Stage, merge and checkpoint each batch in one transaction
//! 5. **Retry**: Reconnect on transient source errors and resume from step 2
//! 6. **Report**: Summarize tasks per stage
//!
//! # Example
//!
//! ```rust,no_run
//! use idr_pipeline::adapters::database::{create_destination_and_checkpoints, create_source_connector};
//! use idr_pipeline::config::load_config;
//! use idr_pipeline::core::orchestrate::{Coordinator, CoordinatorSettings};
//! use idr_pipeline::core::partition::LoadType;
//! use idr_pipeline::entities::default_registry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("idr-pipeline.toml")?;
//! let (destination, checkpoints) = create_destination_and_checkpoints(&config)?;
//!
//! let coordinator = Coordinator::new(
//!     default_registry()?,
//!     create_source_connector(&config)?,
//!     destination,
//!     checkpoints,
//!     CoordinatorSettings::from_config(&config)?,
//! );
//!
//! let summary = coordinator.run(LoadType::Incremental).await?;
//! println!("Tasks loaded: {}", summary.tasks_loaded());
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod load;
pub mod orchestrate;
pub mod partition;
pub mod retry;
pub mod state;
