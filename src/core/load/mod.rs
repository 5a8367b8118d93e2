//! Loading extracted records into the destination
//!
//! - [`batch`] - Batch settings, merge plans and phase timers
//! - [`loader`] - The [`Loader`] driving batch commits

pub mod batch;
pub mod loader;

pub use batch::{
    BatchConfig, CommitStats, MergePlan, Phase, PhaseTimers, CREATED_TS_COLUMN,
    DEFAULT_BATCH_SIZE, UPDATED_TS_COLUMN,
};
pub use loader::Loader;
