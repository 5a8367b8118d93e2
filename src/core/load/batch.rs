//! Batch configuration, merge plans and phase timing

use crate::core::partition::LoadType;
use crate::model::{Entity, EntityExt, UpdatedMarker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Default number of rows committed per destination transaction
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Metadata column stamped when a row is first inserted
pub const CREATED_TS_COLUMN: &str = "bfd_created_ts";

/// Metadata column stamped whenever a merge overwrites a row
pub const UPDATED_TS_COLUMN: &str = "bfd_updated_ts";

/// Loader settings shared by every task of a run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Rows per destination transaction
    pub batch_size: usize,

    /// Write checkpoints after each batch; off for local and synthetic loads
    pub enable_checkpoints: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            enable_checkpoints: true,
        }
    }
}

/// Resolved column layout and merge behavior for loading one entity
///
/// Built once per task and handed to the destination with every batch.
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// Destination table, schema-qualified
    pub table: &'static str,

    /// Unqualified staging table name; temp tables cannot carry a schema
    pub temp_table: String,

    /// Every field in entity order, matching `Record::values`
    pub columns: Vec<&'static str>,

    pub primary_key: Vec<&'static str>,

    /// Columns overwritten on conflict; insert-exclude columns are absent
    pub update_columns: Vec<&'static str>,

    /// Destination-generated columns dropped from the staging table
    pub computed_columns: &'static [&'static str],

    /// `bfd_created_ts` alone for immutable entities, plus `bfd_updated_ts` otherwise
    pub meta_columns: Vec<&'static str>,

    pub immutable: bool,

    /// Delete the table content before merging; cleared after the first batch
    pub replace: bool,

    /// Marker columns to bump, set only for incremental loads
    pub marker: Option<UpdatedMarker>,

    /// Timestamp written to metadata and marker columns
    pub load_ts: DateTime<Utc>,
}

impl MergePlan {
    pub fn new(entity: &dyn Entity, load_type: LoadType, load_ts: DateTime<Utc>) -> Self {
        let table = entity.table();
        let immutable = entity.is_immutable();
        let meta_columns = if immutable {
            vec![CREATED_TS_COLUMN]
        } else {
            vec![CREATED_TS_COLUMN, UPDATED_TS_COLUMN]
        };
        let marker = match load_type {
            LoadType::Incremental => entity.updated_marker(),
            LoadType::Initial => None,
        };

        Self {
            table,
            temp_table: format!("{}_temp", table.rsplit('.').next().unwrap_or(table)),
            columns: entity.fields().iter().map(|f| f.name).collect(),
            primary_key: entity.primary_key().iter().map(|f| f.name).collect(),
            update_columns: entity.update_columns(),
            computed_columns: entity.computed_columns(),
            meta_columns,
            immutable,
            replace: entity.should_replace(),
            marker,
            load_ts,
        }
    }

    /// Whether conflicting rows are left untouched
    pub fn skips_conflicts(&self) -> bool {
        self.immutable || self.update_columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }
}

/// Timed phases of a batch load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    IdrQuery,
    Stage,
    Merge,
    Commit,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::IdrQuery, Phase::Stage, Phase::Merge, Phase::Commit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::IdrQuery => "idr_query",
            Phase::Stage => "stage",
            Phase::Merge => "merge",
            Phase::Commit => "commit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the destination reports after committing one batch
#[derive(Debug, Clone, Default)]
pub struct CommitStats {
    pub rows_staged: u64,
    pub rows_merged: u64,
    pub markers_updated: u64,
    pub stage_elapsed: Duration,
    pub merge_elapsed: Duration,
    pub commit_elapsed: Duration,
}

/// Accumulated time per phase across the batches of one task
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseTimers {
    idr_query: Duration,
    stage: Duration,
    merge: Duration,
    commit: Duration,
}

impl PhaseTimers {
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        *self.slot(phase) += elapsed;
    }

    pub fn record_commit(&mut self, stats: &CommitStats) {
        self.record(Phase::Stage, stats.stage_elapsed);
        self.record(Phase::Merge, stats.merge_elapsed);
        self.record(Phase::Commit, stats.commit_elapsed);
    }

    pub fn total(&self, phase: Phase) -> Duration {
        match phase {
            Phase::IdrQuery => self.idr_query,
            Phase::Stage => self.stage,
            Phase::Merge => self.merge,
            Phase::Commit => self.commit,
        }
    }

    fn slot(&mut self, phase: Phase) -> &mut Duration {
        match phase {
            Phase::IdrQuery => &mut self.idr_query,
            Phase::Stage => &mut self.stage,
            Phase::Merge => &mut self.merge,
            Phase::Commit => &mut self.commit,
        }
    }
}
