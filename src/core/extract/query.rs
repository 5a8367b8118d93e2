//! Extract query construction
//!
//! Renders an entity's template into a bounded, ordered query. The rendered
//! SQL is what the PostgreSQL source executes; the structured parts travel
//! alongside it for sources that evaluate the bounds natively.

use crate::core::partition::Partition;
use crate::core::state::checkpoint::{uses_historical_columns, Checkpoint};
use crate::domain::record::{Cursor, BATCH_ID_COLUMN, CURSOR_TS_COLUMN};
use crate::domain::value::{timestamp_literal, SqlValue, DEFAULT_MIN_DATE};
use crate::domain::Result;
use crate::model::{Entity, EntityExt, FieldSpec, FieldType, QueryContext};
use chrono::{DateTime, NaiveDate, Utc};

const COLUMNS_PLACEHOLDER: &str = "{COLUMNS}";
const WHERE_PLACEHOLDER: &str = "{WHERE_CLAUSE}";
const ORDER_BY_PLACEHOLDER: &str = "{ORDER_BY}";

/// Alias of the indirection table inside the cursor sub-select
const INDIRECTION_ALIAS: &str = "ts_ref";

/// Warehouse-side settings applied to every query of a run
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Schema holding the warehouse views
    pub schema: String,

    /// Restrict claims to their latest version
    pub latest_claims: bool,

    /// Lower date bound for unbounded partitions of date-partitioned entities
    pub min_claim_load_date: NaiveDate,

    /// Years after a verified death before a beneficiary's rows stop loading
    pub death_date_cutoff_years: u32,
}

/// A rendered extract query plus the bounds it encodes
#[derive(Debug, Clone)]
pub struct ExtractQuery {
    pub entity: &'static dyn Entity,
    pub partition: Partition,

    /// Rows at or before this cursor are skipped
    pub bound: Option<Cursor>,

    /// Cursor computed from historical batch timestamps
    pub historical: bool,

    pub min_claim_load_date: NaiveDate,

    pub sql: String,
}

impl ExtractQuery {
    /// Whether a row with this cursor passes the checkpoint bound
    ///
    /// Entities without a batch id compare inclusively on the timestamp, so
    /// rows sharing the last committed timestamp are re-read rather than lost.
    pub fn admits(&self, cursor: &Cursor) -> Result<bool> {
        let Some(bound) = self.bound else {
            return Ok(true);
        };
        Ok(if self.entity.batch_id_field()?.is_some() {
            *cursor > bound
        } else {
            cursor.ts >= bound.ts
        })
    }
}

/// Builds [`ExtractQuery`] values for entity/partition pairs
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    settings: QuerySettings,
}

impl QueryBuilder {
    pub fn new(settings: QuerySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Render the extract query for one task
    ///
    /// # Arguments
    ///
    /// * `entity` - Entity to extract
    /// * `partition` - Partition bounding the rows
    /// * `checkpoint` - Last persisted progress, if any
    /// * `job_start_ts` - Start of the run
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's metadata is inconsistent.
    pub fn build(
        &self,
        entity: &'static dyn Entity,
        partition: &Partition,
        checkpoint: Option<&Checkpoint>,
        job_start_ts: DateTime<Utc>,
    ) -> Result<ExtractQuery> {
        let historical = uses_historical_columns(checkpoint);
        let ctx = QueryContext {
            partition,
            job_start_ts,
            schema: &self.settings.schema,
            latest_claims: self.settings.latest_claims,
            min_claim_load_date: self.settings.min_claim_load_date,
            death_date_cutoff_years: self.settings.death_date_cutoff_years,
        };

        let cursor = self.cursor_expr(entity, historical);
        let batch_id = entity.batch_id_field()?.map(|f| f.source_expr());
        let bound = match (&cursor, checkpoint) {
            (Some(_), Some(cp)) => Some(cp.cursor()),
            _ => None,
        };

        let columns = render_columns(entity, cursor.as_deref(), batch_id.as_deref());
        let where_clause = self.where_clause(
            entity,
            partition,
            cursor.as_deref(),
            batch_id.as_deref(),
            bound,
        );
        let order_by = render_order_by(entity, cursor.is_some(), batch_id.is_some());

        let sql = entity
            .fetch_query(&ctx)
            .replace(COLUMNS_PLACEHOLDER, &columns)
            .replace(WHERE_PLACEHOLDER, &where_clause)
            .replace(ORDER_BY_PLACEHOLDER, &order_by);

        Ok(ExtractQuery {
            entity,
            partition: partition.clone(),
            bound,
            historical,
            min_claim_load_date: self.settings.min_claim_load_date,
            sql,
        })
    }

    /// Expression for the greatest cursor timestamp of a row, if it has one
    pub fn cursor_expr(&self, entity: &dyn Entity, historical: bool) -> Option<String> {
        if let Some(indirection) = entity.timestamp_indirection() {
            let key = entity
                .fields()
                .iter()
                .find(|f| f.name == indirection.key)
                .map(|f| f.source_expr())
                .unwrap_or_else(|| indirection.key.to_string());
            let table = if indirection.table.contains('.') {
                indirection.table.to_string()
            } else {
                format!("{}.{}", self.settings.schema, indirection.table)
            };
            let greatest = greatest_of(
                indirection
                    .columns
                    .iter()
                    .map(|c| format!("{INDIRECTION_ALIAS}.{c}")),
            );
            // Rows without a referencing row sort first instead of carrying a null cursor
            return Some(format!(
                "COALESCE((SELECT MAX({greatest}) FROM {table} {INDIRECTION_ALIAS} \
                 WHERE {INDIRECTION_ALIAS}.{ind_key} = {key}), '{min}')",
                ind_key = indirection.key,
                min = DEFAULT_MIN_DATE.format("%Y-%m-%d")
            ));
        }

        let fields = entity.cursor_fields(historical);
        if fields.is_empty() {
            return None;
        }
        Some(greatest_of(fields.iter().map(|f| f.source_expr())))
    }

    fn where_clause(
        &self,
        entity: &dyn Entity,
        partition: &Partition,
        cursor: Option<&str>,
        batch_id: Option<&str>,
        bound: Option<Cursor>,
    ) -> String {
        let mut clause = String::from("WHERE 1=1");
        let columns = entity.partition_columns();

        if let Some(field) = columns.claim_type.and_then(|name| field_named(entity, name)) {
            if !partition.claim_type_codes.is_empty() {
                let codes = partition
                    .claim_type_codes
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                clause.push_str(&format!(" AND {} IN ({codes})", field.source_expr()));
            }
        }

        if let Some(field) = columns.date.and_then(|name| field_named(entity, name)) {
            match partition.date_range() {
                Some((start, end)) => clause.push_str(&format!(
                    " AND {} BETWEEN {} AND {}",
                    field.source_expr(),
                    SqlValue::Date(start).to_sql_literal(),
                    SqlValue::Date(end).to_sql_literal()
                )),
                None => clause.push_str(&format!(
                    " AND {} >= {}",
                    field.source_expr(),
                    SqlValue::Date(self.settings.min_claim_load_date).to_sql_literal()
                )),
            }
        }

        if let (Some(cursor), Some(bound)) = (cursor, bound) {
            let ts = timestamp_literal(bound.ts);
            match batch_id {
                Some(id) => clause.push_str(&format!(
                    " AND ({cursor} > {ts} OR ({cursor} = {ts} AND {id} > {last_id}))",
                    last_id = bound.id
                )),
                None => clause.push_str(&format!(" AND {cursor} >= {ts}")),
            }
        }

        clause
    }
}

fn field_named(entity: &dyn Entity, name: &str) -> Option<&'static FieldSpec> {
    entity.fields().iter().find(|f| f.name == name)
}

fn greatest_of(exprs: impl Iterator<Item = String>) -> String {
    let min = DEFAULT_MIN_DATE.format("%Y-%m-%d");
    let args = exprs
        .map(|e| format!("COALESCE({e}, '{min}')"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("GREATEST({args})")
}

fn render_columns(entity: &dyn Entity, cursor: Option<&str>, batch_id: Option<&str>) -> String {
    let mut columns: Vec<String> = entity
        .selected_fields()
        .iter()
        .map(|f| format!("{} AS {}", typed_expr(&f.source_expr(), f.field_type), f.name))
        .collect();
    if let Some(cursor) = cursor {
        columns.push(format!("{cursor} AS {CURSOR_TS_COLUMN}"));
        if let Some(id) = batch_id {
            columns.push(format!("{} AS {BATCH_ID_COLUMN}", typed_expr(id, FieldType::Int)));
        }
    }
    columns.join(", ")
}

/// Numeric warehouse columns arrive as NUMERIC; cast them to the binary
/// types the source decodes
fn typed_expr(expr: &str, field_type: FieldType) -> String {
    match field_type {
        FieldType::Int => format!("CAST({expr} AS BIGINT)"),
        FieldType::Float => format!("CAST({expr} AS DOUBLE PRECISION)"),
        _ => expr.to_string(),
    }
}

fn render_order_by(entity: &dyn Entity, has_cursor: bool, has_batch_id: bool) -> String {
    if has_cursor {
        if has_batch_id {
            format!("ORDER BY {CURSOR_TS_COLUMN}, {BATCH_ID_COLUMN}")
        } else {
            format!("ORDER BY {CURSOR_TS_COLUMN}")
        }
    } else {
        let keys = entity
            .primary_key()
            .iter()
            .map(|f| f.source_expr())
            .collect::<Vec<_>>()
            .join(", ");
        format!("ORDER BY {keys}")
    }
}
