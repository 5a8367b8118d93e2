//! Checkpoint model for tracking load progress
//!
//! One checkpoint exists per `(table_name, batch_partition)`. It records the
//! cursor of the last row committed for that partition so the next run only
//! extracts rows strictly after it.

use crate::domain::record::Cursor;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Last day on which warehouse insert timestamps may be null
///
/// Checkpoints at or before this instant select rows by the entity's
/// historical batch timestamp columns instead.
pub fn historical_cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 4, 19, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Persisted progress of one table partition
///
/// # Examples
///
/// ```
/// use idr_pipeline::core::state::Checkpoint;
/// use idr_pipeline::domain::Cursor;
/// use chrono::{TimeZone, Utc};
///
/// let job_start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
/// let ts = Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap();
///
/// let checkpoint = Checkpoint::new("idr.claim", "pac", job_start, job_start)
///     .advanced_to(Cursor::new(ts, 42), job_start);
///
/// assert!(checkpoint.is_new(&Cursor::new(ts, 43)));
/// assert!(!checkpoint.is_new(&Cursor::new(ts, 42)));
/// assert!(!checkpoint.is_historical());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Destination table, schema-qualified
    pub table_name: String,

    /// Partition name the progress applies to
    pub batch_partition: String,

    /// Cursor timestamp of the last committed row
    pub last_ts: DateTime<Utc>,

    /// Batch id of the last committed row, `0` for entities without one
    pub last_id: i64,

    /// Start of the run that wrote this checkpoint
    pub job_start_ts: DateTime<Utc>,

    /// Start of the load of this partition within that run
    pub batch_start_ts: DateTime<Utc>,

    /// Commit time of the last batch
    pub batch_complete_ts: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint positioned before every row
    pub fn new(
        table_name: impl Into<String>,
        batch_partition: impl Into<String>,
        job_start_ts: DateTime<Utc>,
        batch_start_ts: DateTime<Utc>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            batch_partition: batch_partition.into(),
            last_ts: crate::domain::value::min_timestamp(),
            last_id: 0,
            job_start_ts,
            batch_start_ts,
            batch_complete_ts: batch_start_ts,
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.last_ts, self.last_id)
    }

    /// Whether rows should be selected by historical batch timestamps
    pub fn is_historical(&self) -> bool {
        self.last_ts <= historical_cutoff()
    }

    /// A row is new iff its cursor sorts strictly after this checkpoint
    pub fn is_new(&self, cursor: &Cursor) -> bool {
        *cursor > self.cursor()
    }

    /// Return a copy moved to `cursor`, committed at `completed_at`
    pub fn advanced_to(mut self, cursor: Cursor, completed_at: DateTime<Utc>) -> Self {
        self.last_ts = cursor.ts;
        self.last_id = cursor.id;
        self.batch_complete_ts = completed_at;
        self
    }

    /// Time spent between the partition start and its last commit
    pub fn elapsed(&self) -> chrono::Duration {
        self.batch_complete_ts - self.batch_start_ts
    }
}

/// Whether a partition load should use historical batch timestamps
///
/// First loads have no checkpoint and are always historical.
pub fn uses_historical_columns(checkpoint: Option<&Checkpoint>) -> bool {
    checkpoint.map_or(true, Checkpoint::is_historical)
}
