//! Provider history

use crate::core::partition::PartitionGroup;
use crate::domain::value::DEFAULT_MAX_DATE;
use crate::model::{Entity, EntityExt, EntityRole, FieldSpec, Normalization, QueryContext};

// META_SK encodes (YYYYMMDD - 19000000) * 1000 + sequence. A value of 501
// means the insert date is unknown and the last-update key is used instead.
const INSERT_TS_EXPR: &str = "TO_TIMESTAMP(CAST(TRUNC(CASE WHEN meta_sk = 501 \
    THEN meta_lst_updt_sk ELSE meta_sk END / 1000) + 19000000 AS TEXT), 'YYYYMMDD')";

const UPDATE_TS_EXPR: &str = "CASE WHEN meta_sk != 501 AND meta_lst_updt_sk > 0 \
    THEN TO_TIMESTAMP(CAST(TRUNC(meta_lst_updt_sk / 1000) + 19000000 AS TEXT), 'YYYYMMDD') \
    ELSE NULL END";

/// Current provider records keyed by NPI
pub struct ProviderHistory;

const PROVIDER_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("prvdr_npi_num").primary_key(),
    FieldSpec::int("prvdr_sk").batch_id(),
    FieldSpec::date("prvdr_hstry_efctv_dt"),
    FieldSpec::date("prvdr_hstry_obslt_dt").normalize(Normalization::NullDateToMax),
    FieldSpec::text("prvdr_1st_name").normalize(Normalization::NullString),
    FieldSpec::text("prvdr_mdl_name").normalize(Normalization::NullString),
    FieldSpec::text("prvdr_last_name").normalize(Normalization::NullString),
    FieldSpec::text("prvdr_name").normalize(Normalization::ProviderName),
    FieldSpec::text("prvdr_lgl_name").normalize(Normalization::NullString),
    FieldSpec::text("prvdr_type_cd").normalize(Normalization::DefaultString),
    FieldSpec::text("prvdr_txnmy_cmpst_cd").normalize(Normalization::DefaultString),
    FieldSpec::text("prvdr_oscar_num").normalize(Normalization::DefaultString),
    FieldSpec::text("prvdr_emplr_id_num").normalize(Normalization::NullString),
    FieldSpec::timestamp("idr_insrt_ts")
        .batch_timestamp()
        .derived()
        .expr(INSERT_TS_EXPR)
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .derived()
        .expr(UPDATE_TS_EXPR)
        .normalize(Normalization::NullDateToMin),
];

impl Entity for ProviderHistory {
    fn table(&self) -> &'static str {
        "idr.provider_history"
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
        let derived = self
            .fields()
            .iter()
            .filter(|f| f.derived)
            .map(|f| format!("{} AS {}", f.source_expr(), f.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {derived}, {{COLUMNS}}
            FROM {schema}.v2_mdcr_prvdr_hstry
            {{WHERE_CLAUSE}}
            AND prvdr_hstry_obslt_dt >= '{max_date}'
            {{ORDER_BY}}",
            schema = ctx.schema,
            max_date = DEFAULT_MAX_DATE.format("%Y-%m-%d")
        )
    }
}
