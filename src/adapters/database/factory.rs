//! Source and destination factory
//!
//! This module provides factory functions that build the pipeline's
//! connectors from configuration.

use crate::adapters::database::traits::{CheckpointStore, Destination, SourceConnector};
use crate::adapters::memory::MemoryStore;
use crate::adapters::postgresql::{PostgreSQLClient, PostgresDestination, PostgresWarehouse};
use crate::config::PipelineConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Create the warehouse connector
///
/// No session is opened here; workers connect lazily.
///
/// # Arguments
///
/// * `config` - The pipeline configuration
///
/// # Errors
///
/// Returns an error if the connection string or TLS settings are invalid.
pub fn create_source_connector(
    config: &PipelineConfig,
) -> Result<Arc<dyn SourceConnector + Send + Sync>> {
    tracing::info!(schema = %config.source.schema, "Creating warehouse connector");
    let warehouse = PostgresWarehouse::new(&config.source)?;
    Ok(Arc::new(warehouse) as Arc<dyn SourceConnector + Send + Sync>)
}

/// Create the destination and checkpoint store from the same underlying client
///
/// Both share one connection pool, so a batch and its checkpoint commit in
/// the same transaction. Dry runs get an in-memory store instead, which
/// discards everything when the process exits.
///
/// # Arguments
///
/// * `config` - The pipeline configuration
///
/// # Returns
///
/// Returns a tuple of (Destination, CheckpointStore) trait objects
///
/// # Errors
///
/// Returns an error if the client cannot be created.
pub fn create_destination_and_checkpoints(
    config: &PipelineConfig,
) -> Result<(
    Arc<dyn Destination + Send + Sync>,
    Arc<dyn CheckpointStore + Send + Sync>,
)> {
    if config.application.dry_run {
        tracing::info!("DRY RUN: Creating in-memory destination and checkpoint store");
        let store = Arc::new(MemoryStore::new());
        return Ok((
            store.clone() as Arc<dyn Destination + Send + Sync>,
            store as Arc<dyn CheckpointStore + Send + Sync>,
        ));
    }

    tracing::info!("Creating PostgreSQL destination and checkpoint store");
    let client = PostgreSQLClient::new(config.destination.clone())?;
    let destination = Arc::new(PostgresDestination::new(client));

    Ok((
        destination.clone() as Arc<dyn Destination + Send + Sync>,
        destination as Arc<dyn CheckpointStore + Send + Sync>,
    ))
}

/// Create a checkpoint store reading the BFD database
///
/// Used by commands that only inspect progress. Ignores `dry_run`.
///
/// # Errors
///
/// Returns an error if the client cannot be created.
pub fn create_checkpoint_store(
    config: &PipelineConfig,
) -> Result<Arc<dyn CheckpointStore + Send + Sync>> {
    tracing::info!("Creating PostgreSQL checkpoint store");
    let client = PostgreSQLClient::new(config.destination.clone())?;
    Ok(Arc::new(PostgresDestination::new(client)) as Arc<dyn CheckpointStore + Send + Sync>)
}
