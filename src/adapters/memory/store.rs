//! In-memory destination and checkpoint store
//!
//! Applies the same merge rules as the PostgreSQL destination: composite-key
//! upsert, insert-exclude columns preserved, metadata timestamps, full
//! replacement and updated markers, with the checkpoint committed alongside
//! the rows.

use super::compare_values;
use crate::adapters::database::traits::{CheckpointStore, Destination};
use crate::core::load::{CommitStats, MergePlan, UPDATED_TS_COLUMN};
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::{PipelineError, Record, Result, SqlValue};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// A destination row keyed by column name
pub type StoredRow = BTreeMap<String, SqlValue>;

#[derive(Debug, Default)]
struct StoreState {
    tables: HashMap<String, Vec<StoredRow>>,
    checkpoints: BTreeMap<(String, String), Checkpoint>,
    fail_next_commit: Option<String>,
    fail_checkpoint_reads: Option<String>,
    commits: u64,
}

/// Shared in-memory destination; clones refer to the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed destination rows, e.g. marker rows that exist before a load
    pub async fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = StoredRow>) {
        let mut state = self.state.lock().await;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Rows of a table sorted by every column in name order
    pub async fn rows(&self, table: &str) -> Vec<StoredRow> {
        let state = self.state.lock().await;
        let mut rows = state.tables.get(table).cloned().unwrap_or_default();
        rows.sort_by(|a, b| {
            a.values()
                .zip(b.values())
                .map(|(x, y)| compare_values(x, y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }

    /// First row whose `column` equals `value`
    pub async fn find_row(&self, table: &str, column: &str, value: &SqlValue) -> Option<StoredRow> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)?
            .iter()
            .find(|r| r.get(column) == Some(value))
            .cloned()
    }

    /// Make the next `commit_batch` fail before applying anything
    pub async fn fail_next_commit(&self, message: impl Into<String>) {
        self.state.lock().await.fail_next_commit = Some(message.into());
    }

    /// Make every checkpoint read fail
    pub async fn fail_checkpoint_reads(&self, message: impl Into<String>) {
        self.state.lock().await.fail_checkpoint_reads = Some(message.into());
    }

    pub async fn commit_count(&self) -> u64 {
        self.state.lock().await.commits
    }
}

fn key_of(row: &StoredRow, key_columns: &[&str]) -> Vec<String> {
    key_columns
        .iter()
        .map(|c| row.get(*c).map(SqlValue::to_sql_literal).unwrap_or_default())
        .collect()
}

#[async_trait]
impl Destination for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn commit_batch(
        &self,
        plan: &MergePlan,
        rows: &[Record],
        checkpoint: Option<&Checkpoint>,
    ) -> Result<CommitStats> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next_commit.take() {
            return Err(PipelineError::Database(message));
        }

        let stage_start = Instant::now();
        let staged: Vec<StoredRow> = rows
            .iter()
            .map(|record| {
                plan.columns
                    .iter()
                    .zip(&record.values)
                    .map(|(c, v)| (c.to_string(), v.clone().strip_nul()))
                    .collect()
            })
            .collect();
        let stage_elapsed = stage_start.elapsed();

        let merge_start = Instant::now();
        let mut table = if plan.replace {
            Vec::new()
        } else {
            state.tables.get(plan.table).cloned().unwrap_or_default()
        };
        let mut index: HashMap<Vec<String>, usize> = table
            .iter()
            .enumerate()
            .map(|(i, r)| (key_of(r, &plan.primary_key), i))
            .collect();

        let ts = SqlValue::Timestamp(plan.load_ts);
        let mut merged = 0u64;
        for row in &staged {
            let key = key_of(row, &plan.primary_key);
            match index.get(&key) {
                Some(_) if plan.skips_conflicts() => {}
                Some(&i) => {
                    let existing = &mut table[i];
                    for column in &plan.update_columns {
                        if let Some(value) = row.get(*column) {
                            existing.insert(column.to_string(), value.clone());
                        }
                    }
                    existing.insert(UPDATED_TS_COLUMN.to_string(), ts.clone());
                    merged += 1;
                }
                None => {
                    let mut inserted = row.clone();
                    for meta in &plan.meta_columns {
                        inserted.insert(meta.to_string(), ts.clone());
                    }
                    index.insert(key, table.len());
                    table.push(inserted);
                    merged += 1;
                }
            }
        }
        state.tables.insert(plan.table.to_string(), table);

        let mut markers_updated = 0u64;
        if let Some(marker) = plan.marker {
            let keys: HashSet<String> = staged
                .iter()
                .filter_map(|r| r.get(marker.key).map(SqlValue::to_sql_literal))
                .collect();
            if let Some(marker_rows) = state.tables.get_mut(marker.table) {
                for row in marker_rows.iter_mut() {
                    let hit = row
                        .get(marker.key)
                        .map(|v| keys.contains(&v.to_sql_literal()))
                        .unwrap_or(false);
                    if hit {
                        for column in marker.columns {
                            row.insert(column.to_string(), ts.clone());
                        }
                        markers_updated += 1;
                    }
                }
            }
        }
        let merge_elapsed = merge_start.elapsed();

        if let Some(checkpoint) = checkpoint {
            state.checkpoints.insert(
                (
                    checkpoint.table_name.clone(),
                    checkpoint.batch_partition.clone(),
                ),
                checkpoint.clone(),
            );
        }
        state.commits += 1;

        Ok(CommitStats {
            rows_staged: staged.len() as u64,
            rows_merged: merged,
            markers_updated,
            stage_elapsed,
            merge_elapsed,
            commit_elapsed: std::time::Duration::ZERO,
        })
    }

    fn destination_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, table_name: &str, partition: &str) -> Result<Option<Checkpoint>> {
        let state = self.state.lock().await;
        if let Some(message) = &state.fail_checkpoint_reads {
            return Err(PipelineError::Checkpoint(message.clone()));
        }
        Ok(state
            .checkpoints
            .get(&(table_name.to_string(), partition.to_string()))
            .cloned())
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = self.state.lock().await;
        state.checkpoints.insert(
            (
                checkpoint.table_name.clone(),
                checkpoint.batch_partition.clone(),
            ),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        let state = self.state.lock().await;
        if let Some(message) = &state.fail_checkpoint_reads {
            return Err(PipelineError::Checkpoint(message.clone()));
        }
        Ok(state.checkpoints.values().cloned().collect())
    }
}
