//! BFD destination and checkpoint store
//!
//! A batch is staged with `COPY` into a temporary table and merged into the
//! target with `INSERT ... ON CONFLICT`. Staging, merge, updated markers and
//! the checkpoint upsert share one transaction.

use super::client::PostgreSQLClient;
use super::models::{LoadProgressRow, LOAD_PROGRESS_COLUMNS};
use crate::adapters::database::traits::{CheckpointStore, Destination};
use crate::core::load::{CommitStats, MergePlan, UPDATED_TS_COLUMN};
use crate::core::state::Checkpoint;
use crate::domain::value::timestamp_literal;
use crate::domain::{PipelineError, Record, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use std::sync::Arc;
use std::time::Instant;

const UPSERT_PROGRESS_SQL: &str = "
    INSERT INTO idr.load_progress (
        table_name, batch_partition, last_ts, last_id,
        job_start_ts, batch_start_ts, batch_complete_ts
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (table_name, batch_partition) DO UPDATE SET
        last_ts = EXCLUDED.last_ts,
        last_id = EXCLUDED.last_id,
        job_start_ts = EXCLUDED.job_start_ts,
        batch_start_ts = EXCLUDED.batch_start_ts,
        batch_complete_ts = EXCLUDED.batch_complete_ts
";

/// PostgreSQL implementation of [`Destination`] and [`CheckpointStore`]
pub struct PostgresDestination {
    client: Arc<PostgreSQLClient>,
}

impl PostgresDestination {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

fn db_error(context: &str) -> impl Fn(tokio_postgres::Error) -> PipelineError + '_ {
    move |e| PipelineError::Database(format!("{context}: {e}"))
}

fn checkpoint_error(context: &str) -> impl Fn(tokio_postgres::Error) -> PipelineError + '_ {
    move |e| PipelineError::Checkpoint(format!("{context}: {e}"))
}

/// Statements creating the staging table for a batch
///
/// The staging table copies the target layout, minus the columns the
/// batch does not supply.
pub fn staging_sql(plan: &MergePlan) -> Vec<String> {
    let mut statements = vec![format!(
        "CREATE TEMPORARY TABLE {} (LIKE {}) ON COMMIT DROP",
        plan.temp_table, plan.table
    )];
    statements.extend(
        plan.computed_columns
            .iter()
            .chain(plan.meta_columns.iter())
            .map(|column| format!("ALTER TABLE {} DROP COLUMN {}", plan.temp_table, column)),
    );
    statements
}

pub fn copy_sql(plan: &MergePlan) -> String {
    format!(
        "COPY {} ({}) FROM STDIN",
        plan.temp_table,
        plan.columns.join(", ")
    )
}

/// Encode records as `COPY` text rows
pub fn copy_payload(rows: &[Record]) -> String {
    let mut out = String::new();
    for row in rows {
        for (idx, value) in row.values.iter().enumerate() {
            if idx > 0 {
                out.push('\t');
            }
            value.write_copy_text(&mut out);
        }
        out.push('\n');
    }
    out
}

/// Upsert from the staging table into the target
pub fn merge_sql(plan: &MergePlan) -> String {
    let columns = plan.columns.join(", ");
    let ts = timestamp_literal(plan.load_ts);
    let meta_values = vec![ts.as_str(); plan.meta_columns.len()].join(", ");

    let on_conflict = if plan.skips_conflicts() {
        "DO NOTHING".to_string()
    } else {
        let set: Vec<String> = plan
            .update_columns
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();
        format!("DO UPDATE SET {}, {UPDATED_TS_COLUMN} = {ts}", set.join(", "))
    };

    format!(
        "INSERT INTO {table} ({columns}, {meta}) SELECT {columns}, {meta_values} FROM {temp} ON CONFLICT ({pk}) {on_conflict}",
        table = plan.table,
        meta = plan.meta_columns.join(", "),
        temp = plan.temp_table,
        pk = plan.primary_key.join(", "),
    )
}

/// Bump the updated markers of rows touched by the batch
///
/// Marker rows are locked in key order first so concurrent workers
/// updating the same table cannot deadlock.
pub fn marker_sql(plan: &MergePlan) -> Option<String> {
    let marker = plan.marker?;
    let ts = timestamp_literal(plan.load_ts);
    let set: Vec<String> = marker
        .columns
        .iter()
        .map(|c| format!("{c} = {ts}"))
        .collect();

    Some(format!(
        "WITH locked AS (SELECT {key} FROM {table} WHERE {key} IN (SELECT {key} FROM {temp}) ORDER BY {key} FOR UPDATE) \
         UPDATE {table} u SET {set} FROM locked l WHERE u.{key} = l.{key}",
        key = marker.key,
        table = marker.table,
        temp = plan.temp_table,
        set = set.join(", "),
    ))
}

#[async_trait]
impl Destination for PostgresDestination {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }

    async fn commit_batch(
        &self,
        plan: &MergePlan,
        rows: &[Record],
        checkpoint: Option<&Checkpoint>,
    ) -> Result<CommitStats> {
        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(db_error("Failed to begin transaction"))?;
        tx.batch_execute(&self.client.statement_timeout_sql())
            .await
            .map_err(db_error("Failed to set statement timeout"))?;

        let stage_start = Instant::now();
        for statement in staging_sql(plan) {
            tx.batch_execute(&statement)
                .await
                .map_err(db_error("Failed to create staging table"))?;
        }
        let sink = tx
            .copy_in::<_, Bytes>(&copy_sql(plan))
            .await
            .map_err(db_error("Failed to start COPY"))?;
        futures::pin_mut!(sink);
        sink.send(Bytes::from(copy_payload(rows)))
            .await
            .map_err(db_error("Failed to stream COPY data"))?;
        let rows_staged = sink
            .as_mut()
            .finish()
            .await
            .map_err(db_error("Failed to finish COPY"))?;
        let stage_elapsed = stage_start.elapsed();

        let merge_start = Instant::now();
        if plan.replace {
            tx.execute(&format!("DELETE FROM {}", plan.table), &[])
                .await
                .map_err(db_error("Failed to clear table"))?;
        }
        let rows_merged = tx
            .execute(&merge_sql(plan), &[])
            .await
            .map_err(db_error("Merge failed"))?;
        let markers_updated = match marker_sql(plan) {
            Some(statement) => tx
                .execute(&statement, &[])
                .await
                .map_err(db_error("Failed to update markers"))?,
            None => 0,
        };
        let merge_elapsed = merge_start.elapsed();

        if let Some(checkpoint) = checkpoint {
            let row = LoadProgressRow::from(checkpoint);
            tx.execute(
                UPSERT_PROGRESS_SQL,
                &[
                    &row.table_name,
                    &row.batch_partition,
                    &row.last_ts,
                    &row.last_id,
                    &row.job_start_ts,
                    &row.batch_start_ts,
                    &row.batch_complete_ts,
                ],
            )
            .await
            .map_err(checkpoint_error("Failed to save checkpoint"))?;
        }

        let commit_start = Instant::now();
        tx.commit().await.map_err(db_error("Commit failed"))?;

        Ok(CommitStats {
            rows_staged,
            rows_merged,
            markers_updated,
            stage_elapsed,
            merge_elapsed,
            commit_elapsed: commit_start.elapsed(),
        })
    }

    fn destination_name(&self) -> &str {
        "postgresql"
    }
}

#[async_trait]
impl CheckpointStore for PostgresDestination {
    async fn get(&self, table_name: &str, partition: &str) -> Result<Option<Checkpoint>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| PipelineError::Checkpoint(e.to_string()))?;
        let query = format!(
            "SELECT {LOAD_PROGRESS_COLUMNS} FROM idr.load_progress WHERE table_name = $1 AND batch_partition = $2"
        );
        let row = conn
            .query_opt(&query, &[&table_name, &partition])
            .await
            .map_err(checkpoint_error("Failed to load checkpoint"))?;

        row.map(|row| {
            LoadProgressRow::from_row(&row)
                .map(LoadProgressRow::to_domain)
                .map_err(checkpoint_error("Invalid checkpoint row"))
        })
        .transpose()
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| PipelineError::Checkpoint(e.to_string()))?;
        let row = LoadProgressRow::from(checkpoint);
        conn.execute(
            UPSERT_PROGRESS_SQL,
            &[
                &row.table_name,
                &row.batch_partition,
                &row.last_ts,
                &row.last_id,
                &row.job_start_ts,
                &row.batch_start_ts,
                &row.batch_complete_ts,
            ],
        )
        .await
        .map_err(checkpoint_error("Failed to save checkpoint"))?;

        tracing::debug!(
            table = %checkpoint.table_name,
            partition = %checkpoint.batch_partition,
            "Checkpoint saved to PostgreSQL"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| PipelineError::Checkpoint(e.to_string()))?;
        let query = format!(
            "SELECT {LOAD_PROGRESS_COLUMNS} FROM idr.load_progress ORDER BY table_name, batch_partition"
        );
        let rows = conn
            .query(&query, &[])
            .await
            .map_err(checkpoint_error("Failed to list checkpoints"))?;

        rows.iter()
            .map(|row| {
                LoadProgressRow::from_row(row)
                    .map(LoadProgressRow::to_domain)
                    .map_err(checkpoint_error("Invalid checkpoint row"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partition::LoadType;
    use crate::domain::{Cursor, SqlValue};
    use crate::entities::{BeneficiaryOvershareMbi, Claim};
    use crate::model::{Entity, EntityExt};
    use chrono::{TimeZone, Utc};

    fn load_ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_staging_drops_unloaded_columns() {
        let plan = MergePlan::new(&Claim, LoadType::Incremental, load_ts());
        let statements = staging_sql(&plan);
        assert_eq!(
            statements[0],
            "CREATE TEMPORARY TABLE claim_temp (LIKE idr.claim) ON COMMIT DROP"
        );
        assert!(statements
            .iter()
            .any(|s| s == "ALTER TABLE claim_temp DROP COLUMN bfd_created_ts"));
        assert_eq!(
            statements.len(),
            1 + plan.computed_columns.len() + plan.meta_columns.len()
        );
    }

    #[test]
    fn test_merge_updates_everything_but_key_and_insert_exclude() {
        let plan = MergePlan::new(&Claim, LoadType::Incremental, load_ts());
        let sql = merge_sql(&plan);

        assert!(sql.starts_with("INSERT INTO idr.claim ("));
        assert!(sql.contains("FROM claim_temp ON CONFLICT ("));
        assert!(sql.contains("DO UPDATE SET"));
        assert!(sql.ends_with("bfd_updated_ts = TIMESTAMPTZ '2024-06-01 12:00:00.000000+00'"));
        for key in &plan.primary_key {
            assert!(!sql.contains(&format!("{key} = EXCLUDED.{key}")));
        }
        for column in Claim.insert_exclude_columns() {
            assert!(!sql.contains(&format!("{column} = EXCLUDED.{column}")));
        }
    }

    #[test]
    fn test_immutable_or_keyless_merge_skips_conflicts() {
        let plan = MergePlan::new(&BeneficiaryOvershareMbi, LoadType::Initial, load_ts());
        if plan.skips_conflicts() {
            assert!(merge_sql(&plan).ends_with("DO NOTHING"));
        } else {
            assert!(merge_sql(&plan).contains("DO UPDATE SET"));
        }
    }

    #[test]
    fn test_marker_sql_only_for_incremental_loads() {
        let incremental = MergePlan::new(&Claim, LoadType::Incremental, load_ts());
        let initial = MergePlan::new(&Claim, LoadType::Initial, load_ts());
        assert!(marker_sql(&initial).is_none());

        if let Some(marker) = Claim.updated_marker() {
            let sql = marker_sql(&incremental).unwrap();
            assert!(sql.contains(&format!("FROM {}", marker.table)));
            assert!(sql.contains("FOR UPDATE"));
            assert!(sql.contains(&format!("WHERE u.{k} = l.{k}", k = marker.key)));
        }
    }

    #[test]
    fn test_copy_payload_escapes_text() {
        let rows = vec![Record::new(
            vec![
                SqlValue::Int(7),
                SqlValue::from("tab\there\\"),
                SqlValue::Null,
            ],
            Some(Cursor::new(load_ts(), 7)),
        )];
        assert_eq!(copy_payload(&rows), "7\ttab\\there\\\\\t\\N\n");
    }
}
