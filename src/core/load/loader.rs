//! Batch loader
//!
//! Consumes an extract stream, re-chunks it into fixed-size batches and hands
//! each batch to the destination together with the checkpoint it advances
//! to, so rows and progress commit in the same transaction.

use super::batch::{BatchConfig, MergePlan, Phase, PhaseTimers};
use crate::adapters::database::traits::Destination;
use crate::core::extract::RecordStream;
use crate::core::partition::{LoadType, Partition};
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::{Record, Result};
use crate::log_phase_elapsed;
use crate::model::Entity;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Writes extracted records into the destination
#[derive(Clone)]
pub struct Loader {
    destination: Arc<dyn Destination + Send + Sync>,
    config: BatchConfig,
}

/// Per-task state threaded through successive batch commits
struct TaskLoad<'a> {
    plan: MergePlan,
    partition: &'a Partition,
    checkpoint: Checkpoint,
    timers: PhaseTimers,
    rows: u64,
    batches: u64,
}

impl Loader {
    pub fn new(destination: Arc<dyn Destination + Send + Sync>, config: BatchConfig) -> Self {
        Self {
            destination,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Load one task's records
    ///
    /// Batches of `batch_size` rows are committed as they fill up and the
    /// remainder when the stream ends. With checkpoints enabled, each commit
    /// also moves the partition checkpoint to the cursor of the last row it
    /// holds, but only once every row sharing that cursor is in the commit:
    /// a resumed extract starts strictly after the checkpoint, so a cursor
    /// group split across batches would otherwise lose its tail.
    ///
    /// # Arguments
    ///
    /// * `stream` - Ordered record batches from the extractor
    /// * `entity` - Entity being loaded
    /// * `job_start_ts` - Start of the run, stamped on the checkpoint
    /// * `partition` - Partition the records belong to
    /// * `checkpoint` - Checkpoint the extraction resumed from, if any
    /// * `load_type` - Decides whether updated markers are bumped
    ///
    /// # Returns
    ///
    /// `true` if at least one row was loaded.
    ///
    /// # Errors
    ///
    /// Returns the first extraction or commit failure. Batches committed
    /// before it stay committed.
    pub async fn load(
        &self,
        mut stream: RecordStream<'_>,
        entity: &'static dyn Entity,
        job_start_ts: DateTime<Utc>,
        partition: &Partition,
        checkpoint: Option<&Checkpoint>,
        load_type: LoadType,
    ) -> Result<bool> {
        let batch_start_ts = Utc::now();
        let base = match checkpoint {
            Some(cp) => Checkpoint {
                job_start_ts,
                batch_start_ts,
                ..cp.clone()
            },
            None => Checkpoint::new(entity.table(), &partition.name, job_start_ts, batch_start_ts),
        };
        let mut task = TaskLoad {
            plan: MergePlan::new(entity, load_type, batch_start_ts),
            partition,
            checkpoint: base,
            timers: PhaseTimers::default(),
            rows: 0,
            batches: 0,
        };

        let batch_size = self.config.batch_size.max(1);
        let mut buffer: Vec<Record> = Vec::with_capacity(batch_size);
        loop {
            let query_start = Instant::now();
            let next = stream.try_next().await?;
            task.timers.record(Phase::IdrQuery, query_start.elapsed());

            let Some(batch) = next else { break };
            buffer.extend(batch);
            while let Some(ready) = ready_rows(&buffer, batch_size) {
                let chunk: Vec<Record> = buffer.drain(..ready.len).collect();
                self.commit(&mut task, &chunk, ready.advance).await?;
            }
        }
        if !buffer.is_empty() {
            self.commit(&mut task, &buffer, true).await?;
        }

        if task.rows == 0 {
            tracing::info!(
                table = entity.table(),
                partition = %partition,
                "No new rows"
            );
            return Ok(false);
        }

        for phase in Phase::ALL {
            log_phase_elapsed!(entity.table(), partition, phase, task.timers.total(phase));
        }
        tracing::info!(
            table = entity.table(),
            partition = %partition,
            rows = task.rows,
            batches = task.batches,
            last_ts = %task.checkpoint.last_ts,
            last_id = task.checkpoint.last_id,
            "Partition load complete"
        );
        Ok(true)
    }

    async fn commit(&self, task: &mut TaskLoad<'_>, rows: &[Record], advance: bool) -> Result<()> {
        // Rows arrive in cursor order, so the last row carries the maximum.
        let current = task.checkpoint.cursor();
        let cursor = rows
            .last()
            .and_then(|r| r.cursor)
            .filter(|_| advance)
            .map_or(current, |last| last.max(current));
        let advanced = task.checkpoint.clone().advanced_to(cursor, Utc::now());
        let checkpoint = self.config.enable_checkpoints.then_some(&advanced);

        let commit_start = Instant::now();
        let mut stats = self
            .destination
            .commit_batch(&task.plan, rows, checkpoint)
            .await?;
        if stats.commit_elapsed.is_zero() {
            stats.commit_elapsed = commit_start
                .elapsed()
                .saturating_sub(stats.stage_elapsed + stats.merge_elapsed);
        }
        task.timers.record_commit(&stats);

        tracing::debug!(
            table = task.plan.table,
            partition = %task.partition,
            rows = stats.rows_staged,
            merged = stats.rows_merged,
            markers = stats.markers_updated,
            stage_ms = stats.stage_elapsed.as_millis() as u64,
            merge_ms = stats.merge_elapsed.as_millis() as u64,
            commit_ms = stats.commit_elapsed.as_millis() as u64,
            "Batch committed"
        );

        task.plan.replace = false;
        task.checkpoint = advanced;
        task.rows += rows.len() as u64;
        task.batches += 1;
        Ok(())
    }
}

/// Leading buffered rows that can be committed now
#[derive(Debug, PartialEq, Eq)]
struct ReadyRows {
    len: usize,
    /// Whether the checkpoint may move to the cursor of the last committed row
    advance: bool,
}

/// Decide how much of `buffer` to commit next
///
/// A full batch whose trailing cursor group may continue in rows not yet
/// fetched is cut before that group, which stays buffered. When one group
/// fills the whole batch and is known to continue, the batch is committed
/// without moving the checkpoint. Returns `None` while more rows are needed.
fn ready_rows(buffer: &[Record], batch_size: usize) -> Option<ReadyRows> {
    if buffer.len() < batch_size {
        return None;
    }
    let full = ReadyRows {
        len: batch_size,
        advance: true,
    };
    let Some(last) = buffer[batch_size - 1].cursor else {
        return Some(full);
    };
    let continues = |record: &Record| record.cursor == Some(last);
    if buffer.get(batch_size).is_some_and(|next| !continues(next)) {
        return Some(full);
    }

    let group_start = buffer[..batch_size]
        .iter()
        .rposition(|r| !continues(r))
        .map_or(0, |i| i + 1);
    if group_start > 0 {
        Some(ReadyRows {
            len: group_start,
            advance: true,
        })
    } else if buffer.len() > batch_size {
        Some(ReadyRows {
            len: batch_size,
            advance: false,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::traits::CheckpointStore;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{Cursor, PipelineError, RecordBatch, SqlValue};
    use crate::entities::BeneficiaryOvershareMbi;
    use chrono::TimeZone;
    use futures::stream::{self, StreamExt};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn overshare(mbi: &str) -> Record {
        Record::new(vec![SqlValue::from(mbi)], None)
    }

    fn stream_of(batches: Vec<RecordBatch>) -> RecordStream<'static> {
        stream::iter(batches.into_iter().map(Ok)).boxed()
    }

    fn loader(store: &MemoryStore, batch_size: usize, enable_checkpoints: bool) -> Loader {
        Loader::new(
            Arc::new(store.clone()),
            BatchConfig {
                batch_size,
                enable_checkpoints,
            },
        )
    }

    #[tokio::test]
    async fn test_empty_stream_loads_nothing() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        let loaded = loader(&store, 10, true)
            .load(
                stream_of(vec![vec![]]),
                &BeneficiaryOvershareMbi,
                ts(1),
                &partition,
                None,
                LoadType::Initial,
            )
            .await
            .unwrap();
        assert!(!loaded);
        assert_eq!(store.commit_count().await, 0);
    }

    #[tokio::test]
    async fn test_rechunks_into_fixed_batches() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        let batches = vec![
            vec![overshare("1A"), overshare("2A"), overshare("3A")],
            vec![overshare("4A"), overshare("5A")],
        ];
        let loaded = loader(&store, 2, true)
            .load(
                stream_of(batches),
                &BeneficiaryOvershareMbi,
                ts(1),
                &partition,
                None,
                LoadType::Initial,
            )
            .await
            .unwrap();

        assert!(loaded);
        assert_eq!(store.commit_count().await, 3);
        // replacement happens on the first batch only
        assert_eq!(store.rows(BeneficiaryOvershareMbi.table()).await.len(), 5);
        let cp = store
            .get(BeneficiaryOvershareMbi.table(), &partition.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.job_start_ts, ts(1));
        assert_eq!(cp.last_id, 0);
    }

    #[tokio::test]
    async fn test_checkpoints_can_be_disabled() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        loader(&store, 10, false)
            .load(
                stream_of(vec![vec![overshare("1A")]]),
                &BeneficiaryOvershareMbi,
                ts(1),
                &partition,
                None,
                LoadType::Initial,
            )
            .await
            .unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.rows(BeneficiaryOvershareMbi.table()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_committed_batches() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        let items: Vec<Result<RecordBatch>> = vec![
            Ok(vec![overshare("1A"), overshare("2A")]),
            Err(PipelineError::decode("idr.x", "y", "bad")),
        ];
        let err = loader(&store, 2, true)
            .load(
                stream::iter(items).boxed(),
                &BeneficiaryOvershareMbi,
                ts(1),
                &partition,
                None,
                LoadType::Initial,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
        assert_eq!(store.commit_count().await, 1);
    }

    #[tokio::test]
    async fn test_resumed_checkpoint_keeps_cursor_when_rows_have_none() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        let previous = Checkpoint::new(BeneficiaryOvershareMbi.table(), &partition.name, ts(1), ts(1))
            .advanced_to(Cursor::new(ts(2), 9), ts(2));
        loader(&store, 10, true)
            .load(
                stream_of(vec![vec![overshare("1A")]]),
                &BeneficiaryOvershareMbi,
                ts(5),
                &partition,
                Some(&previous),
                LoadType::Incremental,
            )
            .await
            .unwrap();
        let cp = store
            .get(BeneficiaryOvershareMbi.table(), &partition.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.cursor(), Cursor::new(ts(2), 9));
        assert_eq!(cp.job_start_ts, ts(5));
    }

    fn at(day: u32, id: i64) -> Record {
        Record::new(vec![SqlValue::from(format!("{day}-{id}"))], Some(Cursor::new(ts(day), id)))
    }

    #[test]
    fn test_trailing_cursor_group_is_held_back() {
        let buffer = vec![at(1, 1), at(1, 2), at(1, 2)];
        assert_eq!(
            ready_rows(&buffer, 3),
            Some(ReadyRows {
                len: 1,
                advance: true
            })
        );
    }

    #[test]
    fn test_full_batch_commits_once_next_cursor_differs() {
        let buffer = vec![at(1, 1), at(1, 2), at(2, 2)];
        assert_eq!(
            ready_rows(&buffer, 2),
            Some(ReadyRows {
                len: 2,
                advance: true
            })
        );
        assert_eq!(ready_rows(&buffer[..1], 2), None);
    }

    #[test]
    fn test_single_group_batch_waits_then_commits_without_advancing() {
        let buffer = vec![at(1, 7), at(1, 7)];
        assert_eq!(ready_rows(&buffer[..1], 1), None);
        assert_eq!(
            ready_rows(&buffer, 1),
            Some(ReadyRows {
                len: 1,
                advance: false
            })
        );
    }

    #[test]
    fn test_rows_without_cursor_commit_full_batches() {
        let buffer = vec![overshare("1A"), overshare("2A")];
        assert_eq!(
            ready_rows(&buffer, 2),
            Some(ReadyRows {
                len: 2,
                advance: true
            })
        );
    }

    #[tokio::test]
    async fn test_checkpoint_never_splits_a_cursor_group() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        let items: Vec<Result<RecordBatch>> = vec![
            Ok(vec![at(1, 7)]),
            Ok(vec![at(1, 7)]),
            Err(PipelineError::decode("idr.x", "y", "bad")),
        ];
        loader(&store, 1, true)
            .load(
                stream::iter(items).boxed(),
                &BeneficiaryOvershareMbi,
                ts(1),
                &partition,
                None,
                LoadType::Incremental,
            )
            .await
            .unwrap_err();

        // the first row was written, but its group was still open
        assert_eq!(store.commit_count().await, 1);
        let cp = store
            .get(BeneficiaryOvershareMbi.table(), &partition.name)
            .await
            .unwrap()
            .unwrap();
        assert!(cp.is_new(&Cursor::new(ts(1), 7)));
    }

    #[tokio::test]
    async fn test_checkpoint_reaches_last_group_when_stream_ends() {
        let store = MemoryStore::new();
        let partition = Partition::for_table(BeneficiaryOvershareMbi.table());
        loader(&store, 1, true)
            .load(
                stream_of(vec![vec![at(1, 7)], vec![at(1, 7), at(2, 8)]]),
                &BeneficiaryOvershareMbi,
                ts(1),
                &partition,
                None,
                LoadType::Incremental,
            )
            .await
            .unwrap();

        assert_eq!(store.commit_count().await, 3);
        let cp = store
            .get(BeneficiaryOvershareMbi.table(), &partition.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.cursor(), Cursor::new(ts(2), 8));
    }
}
