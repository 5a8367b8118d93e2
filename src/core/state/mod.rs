// Checkpoint model and persistence

pub mod checkpoint;
pub mod manager;

pub use checkpoint::{historical_cutoff, uses_historical_columns, Checkpoint};
pub use manager::CheckpointManager;
