//! Storage abstraction traits
//!
//! This module defines the traits that source and destination adapters must
//! implement to work with the pipeline.

use crate::core::extract::ExtractQuery;
use crate::core::load::{CommitStats, MergePlan};
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::{RawRow, Record, Result};
use async_trait::async_trait;

/// Checkpoint persistence
///
/// One row per `(table_name, batch_partition)`. Implementations must surface
/// every failure as an error; a failed read is never "no progress".
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint of a table partition
    ///
    /// # Arguments
    ///
    /// * `table_name` - Destination table, schema-qualified
    /// * `partition` - Partition name
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(Checkpoint))` if found, `Ok(None)` if the partition was never loaded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::PipelineError::Checkpoint`] if the store cannot be read.
    async fn get(&self, table_name: &str, partition: &str) -> Result<Option<Checkpoint>>;

    /// Insert or overwrite a checkpoint
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::PipelineError::Checkpoint`] if the upsert fails.
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// All checkpoints, ordered by table then partition
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn list(&self) -> Result<Vec<Checkpoint>>;
}

/// Destination store receiving merged batches
#[async_trait]
pub trait Destination: Send + Sync {
    /// Test the destination connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Ensure the progress table exists
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    async fn ensure_schema(&self) -> Result<()>;

    /// Stage, merge and checkpoint one batch in a single transaction
    ///
    /// Either every effect of the batch is visible afterwards or none is.
    ///
    /// # Arguments
    ///
    /// * `plan` - Column layout and merge behavior of the entity
    /// * `rows` - Decoded rows in cursor order
    /// * `checkpoint` - Progress to upsert with the batch, `None` to skip
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the transaction is rolled back.
    async fn commit_batch(
        &self,
        plan: &MergePlan,
        rows: &[Record],
        checkpoint: Option<&Checkpoint>,
    ) -> Result<CommitStats>;

    /// Get the destination name for logging
    fn destination_name(&self) -> &str;
}

/// One open connection to the warehouse
///
/// A connection serves one cursor at a time. Workers own their connection
/// exclusively, so methods take `&mut self`.
#[async_trait]
pub trait SourceConnection: Send {
    /// Start streaming the rows of a query
    ///
    /// # Errors
    ///
    /// Returns a [`crate::domain::SourceError`] classified for the retry policy.
    async fn open_cursor(&mut self, query: &ExtractQuery) -> Result<()>;

    /// Fetch up to `n` rows from the open cursor; empty once exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if no cursor is open or the fetch fails.
    async fn fetch(&mut self, n: usize) -> Result<Vec<RawRow>>;

    /// Release the open cursor, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be closed.
    async fn close_cursor(&mut self) -> Result<()>;

    /// Drop the underlying session and establish a fresh one
    ///
    /// # Errors
    ///
    /// Returns an error if a new session cannot be established.
    async fn reconnect(&mut self) -> Result<()>;
}

/// Opens warehouse connections for workers
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Establish a new connection
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::SourceError::Connection`] if the warehouse is unreachable.
    async fn connect(&self) -> Result<Box<dyn SourceConnection>>;

    /// Get the source name for logging
    fn source_name(&self) -> &str;
}
