//! In-memory warehouse
//!
//! Holds source rows per entity table and answers [`ExtractQuery`] values by
//! evaluating their partition, checkpoint bound and ordering natively, the
//! way the rendered SQL would. Failures can be scheduled to exercise the
//! retry policy.

use super::compare_values;
use crate::adapters::database::traits::{SourceConnection, SourceConnector};
use crate::core::extract::ExtractQuery;
use crate::domain::record::{Cursor, BATCH_ID_COLUMN, CURSOR_TS_COLUMN};
use crate::domain::value::min_timestamp;
use crate::domain::{PipelineError, RawRow, Result, SourceError, SqlValue};
use crate::model::{Entity, EntityExt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct WarehouseState {
    /// Entity rows keyed by destination table, column names matching field names
    tables: HashMap<String, Vec<RawRow>>,
    /// Reference tables consulted by timestamp indirection
    references: HashMap<String, Vec<RawRow>>,
    /// Failures raised by the fetch call with the given ordinal (1-based)
    scheduled: HashMap<u64, SourceError>,
    fetches: u64,
    connections: u64,
    reconnects: u64,
    queries: Vec<String>,
}

/// Shared in-memory warehouse; clones refer to the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    state: Arc<Mutex<WarehouseState>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to an entity's source table
    pub async fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = RawRow>) {
        let mut state = self.state.lock().await;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Replace a row matching `key_column = key` or append it
    pub async fn upsert_row(&self, table: &str, key_column: &str, row: RawRow) {
        let mut state = self.state.lock().await;
        let rows = state.tables.entry(table.to_string()).or_default();
        let key = row.get(key_column).cloned();
        match rows.iter_mut().find(|r| r.get(key_column) == key.as_ref()) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    /// Append rows to a reference table used by timestamp indirection
    pub async fn insert_reference_rows(
        &self,
        table: &str,
        rows: impl IntoIterator<Item = RawRow>,
    ) {
        let mut state = self.state.lock().await;
        state
            .references
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Make the `nth` fetch from now (1-based, across all connections) fail
    pub async fn fail_fetch(&self, nth: u64, error: SourceError) {
        let mut state = self.state.lock().await;
        let at = state.fetches + nth;
        state.scheduled.insert(at, error);
    }

    pub async fn fetch_count(&self) -> u64 {
        self.state.lock().await.fetches
    }

    pub async fn connection_count(&self) -> u64 {
        self.state.lock().await.connections
    }

    pub async fn reconnect_count(&self) -> u64 {
        self.state.lock().await.reconnects
    }

    /// Rendered SQL of every query opened so far
    pub async fn queries(&self) -> Vec<String> {
        self.state.lock().await.queries.clone()
    }
}

#[async_trait]
impl SourceConnector for MemoryWarehouse {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        self.state.lock().await.connections += 1;
        Ok(Box::new(MemorySourceConnection {
            warehouse: self.clone(),
            pending: None,
        }))
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

/// One connection to a [`MemoryWarehouse`]
pub struct MemorySourceConnection {
    warehouse: MemoryWarehouse,
    pending: Option<VecDeque<RawRow>>,
}

#[async_trait]
impl SourceConnection for MemorySourceConnection {
    async fn open_cursor(&mut self, query: &ExtractQuery) -> Result<()> {
        let mut state = self.warehouse.state.lock().await;
        state.queries.push(query.sql.clone());
        let rows = evaluate(&state, query)?;
        tracing::debug!(
            table = query.entity.table(),
            partition = %query.partition,
            rows = rows.len(),
            "Opened in-memory cursor"
        );
        self.pending = Some(rows.into());
        Ok(())
    }

    async fn fetch(&mut self, n: usize) -> Result<Vec<RawRow>> {
        let mut state = self.warehouse.state.lock().await;
        state.fetches += 1;
        let ordinal = state.fetches;
        if let Some(error) = state.scheduled.remove(&ordinal) {
            self.pending = None;
            return Err(error.into());
        }
        drop(state);

        let pending = self.pending.as_mut().ok_or_else(|| {
            PipelineError::from(SourceError::Query("fetch without an open cursor".to_string()))
        })?;
        let take = n.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    async fn close_cursor(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.pending = None;
        self.warehouse.state.lock().await.reconnects += 1;
        Ok(())
    }
}

fn evaluate(state: &WarehouseState, query: &ExtractQuery) -> Result<Vec<RawRow>> {
    let entity = query.entity;
    let columns = entity.partition_columns();
    let batch_id = entity.batch_id_field()?;
    let has_cursor = entity.has_cursor();

    let mut selected = Vec::new();
    for row in state.tables.get(entity.table()).into_iter().flatten() {
        if let Some(column) = columns.claim_type {
            if !query.partition.claim_type_codes.is_empty() {
                match row.get(column).and_then(SqlValue::as_i64) {
                    Some(code) if query.partition.accepts_claim_type(code) => {}
                    _ => continue,
                }
            }
        }

        if let Some(column) = columns.date {
            let Some(date) = row.get(column).and_then(SqlValue::as_date) else {
                continue;
            };
            let admitted = match query.partition.date_range() {
                Some((start, end)) => start <= date && date <= end,
                None => date >= query.min_claim_load_date,
            };
            if !admitted {
                continue;
            }
        }

        let mut row = row.clone();
        if has_cursor {
            let ts = cursor_ts(state, entity, &row, query.historical);
            let id = batch_id
                .and_then(|f| row.get(f.name))
                .and_then(SqlValue::as_i64)
                .unwrap_or(0);
            if !query.admits(&Cursor::new(ts, id))? {
                continue;
            }
            row.insert(CURSOR_TS_COLUMN.to_string(), SqlValue::Timestamp(ts));
            if batch_id.is_some() {
                row.insert(BATCH_ID_COLUMN.to_string(), SqlValue::Int(id));
            }
        }
        selected.push(row);
    }

    if has_cursor {
        selected.sort_by(|a, b| {
            compare_column(a, b, CURSOR_TS_COLUMN).then_with(|| compare_column(a, b, BATCH_ID_COLUMN))
        });
    } else {
        let keys: Vec<&str> = entity.primary_key().iter().map(|f| f.name).collect();
        selected.sort_by(|a, b| {
            keys.iter()
                .map(|k| compare_column(a, b, k))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
    Ok(selected)
}

fn compare_column(a: &RawRow, b: &RawRow, column: &str) -> Ordering {
    compare_values(
        a.get(column).unwrap_or(&SqlValue::Null),
        b.get(column).unwrap_or(&SqlValue::Null),
    )
}

/// Cursor timestamp of a row as the rendered cursor expression computes it
fn cursor_ts(
    state: &WarehouseState,
    entity: &dyn Entity,
    row: &RawRow,
    historical: bool,
) -> DateTime<Utc> {
    match entity.timestamp_indirection() {
        Some(indirection) => {
            let key = row.get(indirection.key);
            state
                .references
                .get(indirection.table)
                .into_iter()
                .flatten()
                .filter(|r| key.is_some() && r.get(indirection.key) == key)
                .map(|r| greatest(r, indirection.columns.iter().copied()))
                .max()
                .unwrap_or_else(min_timestamp)
        }
        None => greatest(row, entity.cursor_fields(historical).iter().map(|f| f.name)),
    }
}

/// Greatest of the given columns, nulls counting as the minimum date
fn greatest<'a>(row: &RawRow, columns: impl Iterator<Item = &'a str>) -> DateTime<Utc> {
    columns
        .filter_map(|c| row.get(c).and_then(SqlValue::as_timestamp))
        .max()
        .unwrap_or_else(min_timestamp)
}
