//! Streaming extraction of decoded record batches

use super::query::{ExtractQuery, QueryBuilder};
use crate::adapters::database::traits::SourceConnection;
use crate::core::partition::Partition;
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::{PipelineError, RecordBatch, Result};
use crate::model::{decode_row, Entity};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

/// Default number of rows requested per source fetch
pub const DEFAULT_FETCH_SIZE: usize = 10_000;

/// Lazy, ordered stream of decoded batches for one task
pub type RecordStream<'a> = BoxStream<'a, Result<RecordBatch>>;

/// Opens bounded cursors and decodes what they return
#[derive(Debug, Clone)]
pub struct Extractor {
    builder: QueryBuilder,
    fetch_size: usize,
}

struct CursorState<'a> {
    conn: &'a mut dyn SourceConnection,
    entity: &'static dyn Entity,
    fetch_size: usize,
    exhausted: bool,
}

impl Extractor {
    pub fn new(builder: QueryBuilder, fetch_size: usize) -> Self {
        Self {
            builder,
            fetch_size: fetch_size.max(1),
        }
    }

    pub fn query_builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Open the extract cursor for a task and stream its rows
    ///
    /// Rows arrive ascending by cursor timestamp then batch id, and only rows
    /// strictly after `checkpoint` are returned. The cursor is closed once
    /// the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be built or the cursor cannot be
    /// opened. Fetch and decode failures surface as stream items.
    pub async fn extract<'a>(
        &self,
        conn: &'a mut dyn SourceConnection,
        entity: &'static dyn Entity,
        partition: &Partition,
        checkpoint: Option<&Checkpoint>,
        job_start_ts: DateTime<Utc>,
    ) -> Result<RecordStream<'a>> {
        let query = self.builder.build(entity, partition, checkpoint, job_start_ts)?;
        self.open(conn, &query).await
    }

    /// Stream the rows of an already built query
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be opened.
    pub async fn open<'a>(
        &self,
        conn: &'a mut dyn SourceConnection,
        query: &ExtractQuery,
    ) -> Result<RecordStream<'a>> {
        tracing::debug!(
            table = query.entity.table(),
            partition = %query.partition,
            historical = query.historical,
            sql = %query.sql,
            "Opening extract cursor"
        );
        conn.open_cursor(query).await?;

        let state = CursorState {
            conn,
            entity: query.entity,
            fetch_size: self.fetch_size,
            exhausted: false,
        };

        Ok(stream::try_unfold(state, |mut state| async move {
            if state.exhausted {
                return Ok::<_, PipelineError>(None);
            }
            let rows = state.conn.fetch(state.fetch_size).await?;
            if rows.is_empty() {
                state.exhausted = true;
                state.conn.close_cursor().await?;
                return Ok(None);
            }
            let batch = rows
                .into_iter()
                .map(|row| decode_row(state.entity, row))
                .collect::<Result<RecordBatch>>()?;
            Ok(Some((batch, state)))
        })
        .boxed())
    }
}
