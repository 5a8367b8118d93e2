//! PostgreSQL row models

use crate::core::state::Checkpoint;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

/// Columns of `idr.load_progress` in statement parameter order
pub const LOAD_PROGRESS_COLUMNS: &str =
    "table_name, batch_partition, last_ts, last_id, job_start_ts, batch_start_ts, batch_complete_ts";

/// Row of `idr.load_progress`
///
/// Maps one-to-one onto [`Checkpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProgressRow {
    pub table_name: String,
    pub batch_partition: String,
    pub last_ts: DateTime<Utc>,
    pub last_id: i64,
    pub job_start_ts: DateTime<Utc>,
    pub batch_start_ts: DateTime<Utc>,
    pub batch_complete_ts: DateTime<Utc>,
}

impl LoadProgressRow {
    /// Read a row selected with [`LOAD_PROGRESS_COLUMNS`]
    ///
    /// # Errors
    ///
    /// Returns the driver error if a column is missing or has another type.
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            table_name: row.try_get("table_name")?,
            batch_partition: row.try_get("batch_partition")?,
            last_ts: row.try_get("last_ts")?,
            last_id: row.try_get("last_id")?,
            job_start_ts: row.try_get("job_start_ts")?,
            batch_start_ts: row.try_get("batch_start_ts")?,
            batch_complete_ts: row.try_get("batch_complete_ts")?,
        })
    }

    pub fn to_domain(self) -> Checkpoint {
        Checkpoint {
            table_name: self.table_name,
            batch_partition: self.batch_partition,
            last_ts: self.last_ts,
            last_id: self.last_id,
            job_start_ts: self.job_start_ts,
            batch_start_ts: self.batch_start_ts,
            batch_complete_ts: self.batch_complete_ts,
        }
    }
}

impl From<&Checkpoint> for LoadProgressRow {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            table_name: checkpoint.table_name.clone(),
            batch_partition: checkpoint.batch_partition.clone(),
            last_ts: checkpoint.last_ts,
            last_id: checkpoint.last_id,
            job_start_ts: checkpoint.job_start_ts,
            batch_start_ts: checkpoint.batch_start_ts,
            batch_complete_ts: checkpoint.batch_complete_ts,
        }
    }
}
