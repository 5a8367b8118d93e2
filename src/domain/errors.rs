//! Domain error types
//!
//! This module defines the error hierarchy for the pipeline. Connector failures
//! are modelled separately in [`SourceError`] so the retry policy can classify
//! them without looking at driver types.

use thiserror::Error;

/// Main pipeline error type
///
/// Every fallible operation in the crate returns this type. Variants carry
/// enough context (table, partition, column) to identify the failing unit of
/// work in logs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Warehouse connector errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Destination database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Checkpoint store errors. Never retried.
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    /// A source row could not be decoded into the entity's declared shape
    #[error("Decode error in {table}.{column}: {message}")]
    Decode {
        table: String,
        column: String,
        message: String,
    },

    /// Entity metadata is inconsistent
    #[error("Entity definition error for {table}: {message}")]
    Entity { table: String, message: String },

    /// A scheduled task failed; wraps the underlying cause
    #[error("Task {table}/{partition} failed: {source}")]
    Task {
        table: String,
        partition: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// A shutdown signal stopped dispatch before every task ran
    #[error("Run interrupted: {0}")]
    Interrupted(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Build a decode error for a column of a table
    pub fn decode(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PipelineError::Decode {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with the table and partition of the task that raised it
    pub fn in_task(self, table: impl Into<String>, partition: impl Into<String>) -> Self {
        PipelineError::Task {
            table: table.into(),
            partition: partition.into(),
            source: Box::new(self),
        }
    }

    /// Returns true if this error is a connector failure worth reconnecting for
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Source(err) => err.is_transient(),
            PipelineError::Task { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Warehouse connector errors
///
/// The first three variants are the transient classes the retry policy
/// recovers from. `Provider` is how a driver reports one of them wrapped in its
/// own envelope.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Session token or credentials expired
    #[error("Reauthentication required: {0}")]
    ReauthenticationRequired(String),

    /// Generic retryable request failure (dropped connection, serialization conflict)
    #[error("Retryable request failure: {0}")]
    RetryableRequest(String),

    /// Access denied, typically during warehouse role rotation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Error reported by a connector provider, wrapping the underlying cause
    #[error("Provider {provider} error: {source}")]
    Provider {
        provider: String,
        #[source]
        source: Box<SourceError>,
    },

    /// Query failed for a non-transient reason (syntax, missing relation)
    #[error("Query failed: {0}")]
    Query(String),

    /// Initial connection could not be established
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl SourceError {
    /// Returns true for the classes the retry policy recovers from
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::ReauthenticationRequired(_)
            | SourceError::RetryableRequest(_)
            | SourceError::Forbidden(_) => true,
            SourceError::Provider { source, .. } => source.is_transient(),
            SourceError::Query(_) | SourceError::Connection(_) => false,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Configuration(format!("TOML parse error: {err}"))
    }
}
