//! Entity descriptor trait
//!
//! Each record type the pipeline loads implements [`Entity`] once, as a unit
//! struct registered in the static registry. The generic extractor and
//! loader consult only this trait; no entity-specific logic lives in the core.

use super::field::FieldSpec;
use crate::core::partition::{Partition, PartitionGroup};
use crate::domain::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Scheduling role of an entity within the staged load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityRole {
    /// Small reference set fully replaced in stage 1
    Denylist,
    /// Refreshed last, after all claim and auxiliary work
    CoreBeneficiary,
    /// Re-expanded across its partitions in stage 3 of incremental loads
    CoreClaim,
    /// Everything else
    Auxiliary,
}

impl fmt::Display for EntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityRole::Denylist => "denylist",
            EntityRole::CoreBeneficiary => "core-beneficiary",
            EntityRole::CoreClaim => "core-claim",
            EntityRole::Auxiliary => "auxiliary",
        };
        write!(f, "{name}")
    }
}

/// Another source table whose timestamps drive incremental filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampIndirection {
    pub table: &'static str,
    /// Join column, present under the same name in both tables
    pub key: &'static str,
    pub columns: &'static [&'static str],
}

/// Destination columns bumped to the load timestamp for keys touched by an
/// incremental load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedMarker {
    pub table: &'static str,
    /// Key column, present under the same name in the entity and the marker table
    pub key: &'static str,
    pub columns: &'static [&'static str],
}

/// Source expressions the partition bounds apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionColumns {
    pub claim_type: Option<&'static str>,
    pub date: Option<&'static str>,
}

/// Parameters handed to an entity's query template
#[derive(Debug, Clone)]
pub struct QueryContext<'a> {
    pub partition: &'a Partition,
    pub job_start_ts: DateTime<Utc>,
    /// Warehouse schema holding the source views
    pub schema: &'a str,
    pub latest_claims: bool,
    pub min_claim_load_date: NaiveDate,
    /// Beneficiaries verified dead for longer than this are not extracted
    pub death_date_cutoff_years: u32,
}

/// Static metadata and query hook for one record type
pub trait Entity: Send + Sync + 'static {
    /// Destination table, schema-qualified
    fn table(&self) -> &'static str;

    /// Fields in destination column order
    fn fields(&self) -> &'static [FieldSpec];

    fn role(&self) -> EntityRole;

    /// Partition groups this entity is extracted by; empty for a single unbounded task
    fn partition_groups(&self) -> &'static [PartitionGroup];

    /// Query template containing `{COLUMNS}`, `{WHERE_CLAUSE}` and `{ORDER_BY}`
    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String;

    /// Replace the destination table content instead of merging
    fn should_replace(&self) -> bool {
        false
    }

    /// Destination-generated columns the loader never writes
    fn computed_columns(&self) -> &'static [&'static str] {
        &[]
    }

    fn timestamp_indirection(&self) -> Option<TimestampIndirection> {
        None
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        None
    }

    fn partition_columns(&self) -> PartitionColumns {
        PartitionColumns::default()
    }
}

impl fmt::Debug for dyn Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.table())
            .field("role", &self.role())
            .finish()
    }
}

/// Role-derived views over an entity's fields
pub trait EntityExt: Entity {
    fn primary_key(&self) -> Vec<&'static FieldSpec> {
        self.fields().iter().filter(|f| f.primary_key).collect()
    }

    /// The single batch-id field, if any
    ///
    /// # Errors
    ///
    /// Returns an error if more than one field is tagged as batch id.
    fn batch_id_field(&self) -> Result<Option<&'static FieldSpec>> {
        let mut ids = self.fields().iter().filter(|f| f.batch_id);
        let first = ids.next();
        if ids.next().is_some() {
            return Err(PipelineError::Entity {
                table: self.table().to_string(),
                message: "more than one field is tagged as batch id".to_string(),
            });
        }
        Ok(first)
    }

    /// Batch timestamps, preferring historical ones when requested and declared
    fn batch_timestamp_fields(&self, historical: bool) -> Vec<&'static FieldSpec> {
        if historical {
            let hist: Vec<_> = self
                .fields()
                .iter()
                .filter(|f| f.historical_batch_timestamp)
                .collect();
            if !hist.is_empty() {
                return hist;
            }
        }
        self.fields().iter().filter(|f| f.batch_timestamp).collect()
    }

    fn update_timestamp_fields(&self) -> Vec<&'static FieldSpec> {
        self.fields().iter().filter(|f| f.update_timestamp).collect()
    }

    /// Fields whose greatest value forms the row cursor
    fn cursor_fields(&self, historical: bool) -> Vec<&'static FieldSpec> {
        let mut fields = self.batch_timestamp_fields(historical);
        fields.extend(self.update_timestamp_fields());
        fields
    }

    /// Whether rows carry a cursor at all; entities without one are extracted in full
    fn has_cursor(&self) -> bool {
        self.timestamp_indirection().is_some()
            || self.fields().iter().any(|f| f.is_timestamp_role())
    }

    /// Entities without update timestamps never change once inserted
    fn is_immutable(&self) -> bool {
        self.update_timestamp_fields().is_empty()
    }

    /// Fields rendered into `{COLUMNS}`
    fn selected_fields(&self) -> Vec<&'static FieldSpec> {
        self.fields().iter().filter(|f| !f.derived).collect()
    }

    /// Columns overwritten when a merge hits an existing key
    fn update_columns(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|f| !f.primary_key && !f.insert_exclude)
            .map(|f| f.name)
            .collect()
    }

    fn insert_exclude_columns(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|f| f.insert_exclude)
            .map(|f| f.name)
            .collect()
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name == name)
    }

    /// Whether the entity declares any partition groups
    fn is_partitioned(&self) -> bool {
        !self.partition_groups().is_empty()
    }
}

impl<T: Entity + ?Sized> EntityExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partition::Partition;
    use crate::model::Normalization;

    struct Sample;

    const SAMPLE_FIELDS: &[FieldSpec] = &[
        FieldSpec::int("clm_uniq_id").primary_key().batch_id(),
        FieldSpec::text("clm_cntl_num"),
        FieldSpec::timestamp("idr_insrt_ts")
            .batch_timestamp()
            .insert_exclude()
            .normalize(Normalization::NullDateToMin),
        FieldSpec::timestamp("idr_updt_ts")
            .update_timestamp()
            .insert_exclude()
            .normalize(Normalization::NullDateToMin),
        FieldSpec::date("clm_idr_ld_dt").historical_batch_timestamp(),
    ];

    impl Entity for Sample {
        fn table(&self) -> &'static str {
            "idr.sample_claim"
        }
        fn fields(&self) -> &'static [FieldSpec] {
            SAMPLE_FIELDS
        }
        fn role(&self) -> EntityRole {
            EntityRole::CoreClaim
        }
        fn partition_groups(&self) -> &'static [PartitionGroup] {
            &[]
        }
        fn fetch_query(&self, _ctx: &QueryContext<'_>) -> String {
            "SELECT {COLUMNS} FROM clm {WHERE_CLAUSE} {ORDER_BY}".to_string()
        }
    }

    #[test]
    fn test_role_views() {
        let entity: &dyn Entity = &Sample;
        assert_eq!(entity.primary_key().len(), 1);
        assert_eq!(entity.batch_id_field().unwrap().unwrap().name, "clm_uniq_id");
        assert_eq!(entity.update_columns(), vec!["clm_cntl_num", "clm_idr_ld_dt"]);
        assert_eq!(
            entity.insert_exclude_columns(),
            vec!["idr_insrt_ts", "idr_updt_ts"]
        );
        assert!(!entity.is_immutable());
        assert!(entity.has_cursor());
    }

    #[test]
    fn test_historical_cursor_fields() {
        let names = |fields: Vec<&FieldSpec>| fields.iter().map(|f| f.name).collect::<Vec<_>>();
        assert_eq!(names(Sample.cursor_fields(false)), vec!["idr_insrt_ts", "idr_updt_ts"]);
        assert_eq!(names(Sample.cursor_fields(true)), vec!["clm_idr_ld_dt", "idr_updt_ts"]);
    }

    #[test]
    fn test_unpartitioned_entity_uses_table_partition() {
        let partition = Partition::for_table(Sample.table());
        assert!(!Sample.is_partitioned());
        assert_eq!(partition.name, "idr.sample_claim");
    }
}
