//! PostgreSQL client implementation
//!
//! Connection settings shared by the warehouse source and the BFD
//! destination, plus the pooled client the destination writes through.

use crate::config::DestinationConfig;
use crate::domain::{PipelineError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;

/// Parse a connection string and apply the configured TLS mode
///
/// # Errors
///
/// Returns a configuration error if the string cannot be parsed.
pub fn parse_connection(
    connection_string: &str,
    ssl_mode: &str,
    connect_timeout: Duration,
) -> Result<tokio_postgres::Config> {
    let mut pg_config: tokio_postgres::Config = connection_string.parse().map_err(|e| {
        PipelineError::Configuration(format!("Invalid PostgreSQL connection string: {}", e))
    })?;
    pg_config.ssl_mode(match ssl_mode {
        "disable" => SslMode::Disable,
        "allow" | "prefer" => SslMode::Prefer,
        _ => SslMode::Require,
    });
    if !connect_timeout.is_zero() {
        pg_config.connect_timeout(connect_timeout);
    }
    Ok(pg_config)
}

/// Build the TLS connector for a `ssl_mode`
///
/// `require` encrypts without verifying the server, `verify-ca` checks the
/// chain only, `verify-full` checks the chain and host name.
///
/// # Errors
///
/// Returns a configuration error if the platform TLS backend fails to initialize.
pub fn make_tls(ssl_mode: &str) -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    match ssl_mode {
        "verify-full" => {}
        "verify-ca" => {
            builder.danger_accept_invalid_hostnames(true);
        }
        _ => {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
    }
    let connector = builder
        .build()
        .map_err(|e| PipelineError::Configuration(format!("Failed to initialize TLS: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}

/// Redact credentials from a connection string for logging
pub fn redact_connection_string(connection_string: &str) -> String {
    connection_string
        .rsplit('@')
        .next()
        .filter(|host| *host != connection_string)
        .map(|s| format!("postgresql://***@{}", s))
        .unwrap_or_else(|| "postgresql://***".to_string())
}

/// Pooled PostgreSQL client for the BFD database
pub struct PostgreSQLClient {
    /// Connection pool
    pool: Pool,

    /// Configuration
    config: DestinationConfig,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// No connection is opened until the pool is first used.
    ///
    /// # Arguments
    ///
    /// * `config` - Destination configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid or the pool cannot be built.
    pub fn new(config: DestinationConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let pg_config = parse_connection(
            config.connection_string.expose_secret().as_ref(),
            &config.ssl_mode,
            timeout,
        )?;
        let tls = make_tls(&config.ssl_mode)?;

        let manager = Manager::from_config(
            pg_config,
            tls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .recycle_timeout(Some(timeout))
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                PipelineError::Database(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool, config })
    }

    /// Test the connection to PostgreSQL
    ///
    /// Attempts to get a connection from the pool and execute a simple query.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;

        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| PipelineError::Database(format!("Connection test failed: {}", e)))?;

        tracing::info!(
            destination = %self.connection_string_safe(),
            "PostgreSQL connection test successful"
        );
        Ok(())
    }

    /// Ensure the progress table exists
    ///
    /// Runs the bundled migration; every statement in it is idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.get_connection().await?;

        let migration_sql = include_str!("../../../migrations/001_load_progress.sql");

        client
            .batch_execute(migration_sql)
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to execute migration: {}", e)))?;

        tracing::info!("PostgreSQL schema initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be obtained.
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            PipelineError::Database(format!("Failed to get connection from pool: {}", e))
        })
    }

    /// `SET LOCAL` statement applying the configured statement timeout
    pub fn statement_timeout_sql(&self) -> String {
        format!(
            "SET LOCAL statement_timeout = {}",
            self.config.statement_timeout_seconds * 1000
        )
    }

    /// Get the connection string (without password)
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_ref())
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}
