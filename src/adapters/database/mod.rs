//! Storage abstraction layer
//!
//! Traits for the warehouse source, the destination and the checkpoint
//! store, and the factory choosing their implementations.

pub mod factory;
pub mod traits;

pub use factory::{create_checkpoint_store, create_destination_and_checkpoints, create_source_connector};
pub use traits::{CheckpointStore, Destination, SourceConnection, SourceConnector};
