//! Shared fixtures for the integration tests
//!
//! A small clinic-shaped entity set that exercises every role: a denylist,
//! an unpartitioned auxiliary table, a date-partitioned core claim with an
//! updated marker, and a core beneficiary.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use idr_pipeline::adapters::memory::{MemoryStore, MemoryWarehouse};
use idr_pipeline::core::extract::QuerySettings;
use idr_pipeline::core::load::BatchConfig;
use idr_pipeline::core::orchestrate::{Coordinator, CoordinatorSettings, PoolSettings};
use idr_pipeline::core::partition::{DateInterval, PartitionGroup, PartitionType};
use idr_pipeline::core::retry::RetryPolicy;
use idr_pipeline::domain::{RawRow, SqlValue};
use idr_pipeline::model::{
    Entity, EntityRegistry, EntityRole, FieldSpec, Normalization, PartitionColumns, QueryContext,
    UpdatedMarker,
};
use std::sync::Arc;
use std::time::Duration;

pub const DENIED_TABLE: &str = "test.denied_member";
pub const PROVIDER_TABLE: &str = "test.provider";
pub const VISIT_TABLE: &str = "test.visit";
pub const MEMBER_TABLE: &str = "test.member";
pub const VISIT_LINE_TABLE: &str = "test.visit_line";

/// Earliest visit date extracted, and the first initial-load partition
pub fn min_load_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn ts(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
}

pub struct DeniedMember;

const DENIED_FIELDS: &[FieldSpec] = &[FieldSpec::text("member_mbi").primary_key()];

impl Entity for DeniedMember {
    fn table(&self) -> &'static str {
        DENIED_TABLE
    }
    fn fields(&self) -> &'static [FieldSpec] {
        DENIED_FIELDS
    }
    fn role(&self) -> EntityRole {
        EntityRole::Denylist
    }
    fn partition_groups(&self) -> &'static [PartitionGroup] {
        &[]
    }
    fn should_replace(&self) -> bool {
        true
    }
    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}} FROM {}.denied_member {{WHERE_CLAUSE}} {{ORDER_BY}}",
            ctx.schema
        )
    }
}

pub struct Provider;

const PROVIDER_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("provider_id").primary_key().batch_id(),
    FieldSpec::text("provider_name").normalize(Normalization::NullString),
    FieldSpec::timestamp("idr_insrt_ts").batch_timestamp(),
];

impl Entity for Provider {
    fn table(&self) -> &'static str {
        PROVIDER_TABLE
    }
    fn fields(&self) -> &'static [FieldSpec] {
        PROVIDER_FIELDS
    }
    fn role(&self) -> EntityRole {
        EntityRole::Auxiliary
    }
    fn partition_groups(&self) -> &'static [PartitionGroup] {
        &[]
    }
    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}} FROM {}.provider {{WHERE_CLAUSE}} {{ORDER_BY}}",
            ctx.schema
        )
    }
}

pub struct Visit;

const VISIT_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("visit_id").primary_key().batch_id(),
    FieldSpec::int("member_id"),
    FieldSpec::int("visit_type_cd"),
    FieldSpec::date("visit_dt"),
    FieldSpec::text("note"),
    FieldSpec::timestamp("idr_insrt_ts")
        .batch_timestamp()
        .insert_exclude(),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .nullable(),
];

pub const VISIT_GROUPS: &[PartitionGroup] = &[PartitionGroup::new(
    "visits",
    &[1, 2],
    PartitionType::ALL,
    Some(DateInterval::Years(1)),
    0,
)];

impl Entity for Visit {
    fn table(&self) -> &'static str {
        VISIT_TABLE
    }
    fn fields(&self) -> &'static [FieldSpec] {
        VISIT_FIELDS
    }
    fn role(&self) -> EntityRole {
        EntityRole::CoreClaim
    }
    fn partition_groups(&self) -> &'static [PartitionGroup] {
        VISIT_GROUPS
    }
    fn partition_columns(&self) -> PartitionColumns {
        PartitionColumns {
            claim_type: Some("visit_type_cd"),
            date: Some("visit_dt"),
        }
    }
    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(UpdatedMarker {
            table: MEMBER_TABLE,
            key: "member_id",
            columns: &["bfd_visit_updated_ts"],
        })
    }
    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}} FROM {}.visit {{WHERE_CLAUSE}} {{ORDER_BY}}",
            ctx.schema
        )
    }
}

pub struct Member;

const MEMBER_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("member_id").primary_key().batch_id(),
    FieldSpec::text("member_name"),
    FieldSpec::timestamp("idr_insrt_ts").batch_timestamp(),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .nullable(),
];

impl Entity for Member {
    fn table(&self) -> &'static str {
        MEMBER_TABLE
    }
    fn fields(&self) -> &'static [FieldSpec] {
        MEMBER_FIELDS
    }
    fn role(&self) -> EntityRole {
        EntityRole::CoreBeneficiary
    }
    fn partition_groups(&self) -> &'static [PartitionGroup] {
        &[]
    }
    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}} FROM {}.member {{WHERE_CLAUSE}} {{ORDER_BY}}",
            ctx.schema
        )
    }
}

/// Visit lines share their visit's id as batch id, so several rows carry
/// the same cursor
pub struct VisitLine;

const VISIT_LINE_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("visit_id").primary_key().batch_id(),
    FieldSpec::int("line_num").primary_key(),
    FieldSpec::text("service"),
    FieldSpec::timestamp("idr_insrt_ts").batch_timestamp(),
];

impl Entity for VisitLine {
    fn table(&self) -> &'static str {
        VISIT_LINE_TABLE
    }
    fn fields(&self) -> &'static [FieldSpec] {
        VISIT_LINE_FIELDS
    }
    fn role(&self) -> EntityRole {
        EntityRole::Auxiliary
    }
    fn partition_groups(&self) -> &'static [PartitionGroup] {
        &[]
    }
    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}} FROM {}.visit_line {{WHERE_CLAUSE}} {{ORDER_BY}}",
            ctx.schema
        )
    }
}

/// Registry of only the given entities, for tests that count fetches
pub fn registry_of(entities: Vec<&'static dyn Entity>) -> EntityRegistry {
    EntityRegistry::new(entities).unwrap()
}

pub fn clinic_registry() -> EntityRegistry {
    EntityRegistry::new(vec![
        &DeniedMember as &'static dyn Entity,
        &Provider,
        &Visit,
        &Member,
    ])
    .unwrap()
}

pub fn denied_row(mbi: &str) -> RawRow {
    let mut row = RawRow::new();
    row.insert("member_mbi".into(), SqlValue::from(mbi));
    row
}

pub fn provider_row(id: i64, name: Option<&str>, inserted: DateTime<Utc>) -> RawRow {
    let mut row = RawRow::new();
    row.insert("provider_id".into(), SqlValue::Int(id));
    row.insert(
        "provider_name".into(),
        name.map(SqlValue::from).unwrap_or(SqlValue::Null),
    );
    row.insert("idr_insrt_ts".into(), SqlValue::Timestamp(inserted));
    row
}

pub fn visit_row(
    id: i64,
    member_id: i64,
    type_cd: i64,
    visit_dt: NaiveDate,
    note: &str,
    inserted: DateTime<Utc>,
    updated: Option<DateTime<Utc>>,
) -> RawRow {
    let mut row = RawRow::new();
    row.insert("visit_id".into(), SqlValue::Int(id));
    row.insert("member_id".into(), SqlValue::Int(member_id));
    row.insert("visit_type_cd".into(), SqlValue::Int(type_cd));
    row.insert("visit_dt".into(), SqlValue::Date(visit_dt));
    row.insert("note".into(), SqlValue::from(note));
    row.insert("idr_insrt_ts".into(), SqlValue::Timestamp(inserted));
    row.insert(
        "idr_updt_ts".into(),
        updated.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null),
    );
    row
}

pub fn visit_line_row(visit_id: i64, line_num: i64, service: &str, inserted: DateTime<Utc>) -> RawRow {
    let mut row = RawRow::new();
    row.insert("visit_id".into(), SqlValue::Int(visit_id));
    row.insert("line_num".into(), SqlValue::Int(line_num));
    row.insert("service".into(), SqlValue::from(service));
    row.insert("idr_insrt_ts".into(), SqlValue::Timestamp(inserted));
    row
}

pub fn member_row(id: i64, name: &str, inserted: DateTime<Utc>) -> RawRow {
    let mut row = RawRow::new();
    row.insert("member_id".into(), SqlValue::Int(id));
    row.insert("member_name".into(), SqlValue::from(name));
    row.insert("idr_insrt_ts".into(), SqlValue::Timestamp(inserted));
    row.insert("idr_updt_ts".into(), SqlValue::Null);
    row
}

/// Settings with checkpoints on, a fixed seed and a short retry delay
pub fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        query: QuerySettings {
            schema: "clinic".to_string(),
            latest_claims: false,
            min_claim_load_date: min_load_date(),
            death_date_cutoff_years: 4,
        },
        fetch_size: 2,
        batch: BatchConfig {
            batch_size: 2,
            enable_checkpoints: true,
        },
        retry: RetryPolicy {
            max_errors: 3,
            window: Duration::from_secs(10),
            delay: Duration::from_millis(1),
        },
        pool: PoolSettings {
            max_workers: 2,
            max_tasks_per_worker: 2,
        },
        interval_override: None,
        shuffle_seed: Some(7),
    }
}

/// Warehouse and store shared by every coordinator a test builds
#[derive(Clone, Default)]
pub struct Harness {
    pub warehouse: MemoryWarehouse,
    pub store: MemoryStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coordinator(&self, registry: EntityRegistry, settings: CoordinatorSettings) -> Coordinator {
        Coordinator::new(
            registry,
            Arc::new(self.warehouse.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            settings,
        )
    }

    /// One denied member, two providers, three visits and two members
    pub async fn seed_clinic(&self) {
        self.warehouse
            .insert_rows(DENIED_TABLE, vec![denied_row("1S00E00AA00")])
            .await;
        self.warehouse
            .insert_rows(
                PROVIDER_TABLE,
                vec![
                    provider_row(10, Some("Northside Clinic"), ts(1, 5)),
                    provider_row(11, None, ts(1, 6)),
                ],
            )
            .await;
        self.warehouse
            .insert_rows(
                VISIT_TABLE,
                vec![
                    visit_row(100, 1, 1, date(2024, 3, 1), "checkup", ts(3, 2), None),
                    visit_row(101, 2, 2, date(2025, 2, 1), "follow-up", ts(3, 3), None),
                    // outside every partition's claim types
                    visit_row(102, 2, 9, date(2024, 5, 1), "dental", ts(3, 4), None),
                ],
            )
            .await;
        self.warehouse
            .insert_rows(
                MEMBER_TABLE,
                vec![
                    member_row(1, "Ada", ts(2, 1)),
                    member_row(2, "Grace", ts(2, 2)),
                ],
            )
            .await;
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
