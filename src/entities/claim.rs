//! Claim entities

use super::beneficiary::deceased_bene_filter;
use super::{ADJUDICATED_PARTITIONS, CLAIM_TABLE, PART_D_CLAIM_TYPE_CODES, PART_D_PARTITIONS};
use crate::core::partition::{PartitionGroup, PartitionType};
use crate::domain::value::timestamp_literal;
use crate::model::{
    Entity, EntityRole, FieldSpec, Normalization, PartitionColumns, QueryContext,
    TimestampIndirection, UpdatedMarker,
};
use chrono::Duration;

const CLM: &str = "clm";
const LINE: &str = "line";
const RX_LINE: &str = "rx_line";
const SGNTR: &str = "sgntr";

const FISS_CLM_SOURCE: &str = "21000";
const MCS_CLM_SOURCE: &str = "22000";
const VMS_CLM_SOURCE: &str = "23000";

/// Partially adjudicated claims older than this are not loaded
const PAC_CUTOFF_DAYS: i64 = 60;

const CLAIM_PARTITION_COLUMNS: PartitionColumns = PartitionColumns {
    claim_type: Some("clm_type_cd"),
    date: Some("clm_from_dt"),
};

const CLAIM_UPDATED_MARKER: UpdatedMarker = UpdatedMarker {
    table: CLAIM_TABLE,
    key: "clm_uniq_id",
    columns: &["bfd_claim_updated_ts"],
};

/// Claim-level filters shared by every claim query, appended after `{WHERE_CLAUSE}`
///
/// Claim type and date bounds come from the partition through the query
/// builder. This adds the beneficiary (known and not long deceased),
/// latest-claim and partially adjudicated claim rules.
pub fn claim_filter(ctx: &QueryContext<'_>) -> String {
    let partition_type = ctx.partition.partition_type;
    let mut clauses = vec![
        format!("{CLM}.bene_sk != 0"),
        format!(
            "NOT EXISTS ({} AND dcsd.bene_sk = {CLM}.bene_sk)",
            deceased_bene_filter(ctx)
        ),
        format!("{CLM}.clm_from_dt <= {CLM}.clm_thru_dt"),
    ];

    if ctx.latest_claims {
        // Part D needs every claim version, not only the latest
        if partition_type.intersects(PartitionType::PART_D | PartitionType::ALL) {
            let codes = PART_D_CLAIM_TYPE_CODES
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",");
            clauses.push(format!(
                "({CLM}.clm_ltst_clm_ind = 'Y' OR {CLM}.clm_type_cd IN ({codes}))"
            ));
        } else {
            clauses.push(format!("{CLM}.clm_ltst_clm_ind = 'Y'"));
        }
    }

    if partition_type.intersects(PartitionType::PAC | PartitionType::ALL) {
        let cutoff = timestamp_literal(ctx.job_start_ts - Duration::days(PAC_CUTOFF_DAYS));
        clauses.push(format!(
            "({CLM}.clm_type_cd NOT BETWEEN 1000 AND 1999
              OR ({CLM}.clm_src_id IN ('{FISS_CLM_SOURCE}', '{MCS_CLM_SOURCE}', '{VMS_CLM_SOURCE}')
                  AND COALESCE({CLM}.idr_updt_ts, {CLM}.idr_insrt_ts, {CLM}.clm_idr_ld_dt) >= {cutoff}))"
        ));
    }

    format!("({})", clauses.join(" AND "))
}

/// Claim header
pub struct Claim;

const CLAIM_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("clm_uniq_id").primary_key().batch_id().alias(CLM),
    FieldSpec::int("clm_type_cd").alias(CLM),
    FieldSpec::int("bene_sk").alias(CLM),
    FieldSpec::text("clm_cntl_num").alias(CLM),
    FieldSpec::text("clm_src_id").alias(CLM).normalize(Normalization::DefaultString),
    FieldSpec::date("clm_from_dt").alias(CLM),
    FieldSpec::date("clm_thru_dt").alias(CLM),
    FieldSpec::date("clm_efctv_dt").alias(CLM),
    FieldSpec::date("clm_obslt_dt")
        .nullable()
        .alias(CLM)
        .normalize(Normalization::DefaultDateToNull),
    FieldSpec::date("clm_pd_dt")
        .nullable()
        .alias(CLM)
        .normalize(Normalization::DefaultDateToNull),
    FieldSpec::text("clm_finl_actn_ind").alias(CLM),
    FieldSpec::text("clm_ltst_clm_ind").alias(CLM),
    FieldSpec::text("clm_adjstmt_type_cd")
        .alias(CLM)
        .normalize(Normalization::DefaultString),
    FieldSpec::float("clm_pmt_amt").nullable().alias(CLM),
    FieldSpec::timestamp("idr_insrt_ts")
        .batch_timestamp()
        .insert_exclude()
        .alias(CLM)
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .insert_exclude()
        .alias(CLM)
        .normalize(Normalization::NullDateToMin),
    FieldSpec::date("clm_idr_ld_dt")
        .historical_batch_timestamp()
        .alias(CLM),
];

impl Entity for Claim {
    fn table(&self) -> &'static str {
        CLAIM_TABLE
    }

    fn fields(&self) -> &'static [FieldSpec] {
        CLAIM_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::CoreClaim
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        ADJUDICATED_PARTITIONS
    }

    fn partition_columns(&self) -> PartitionColumns {
        CLAIM_PARTITION_COLUMNS
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(CLAIM_UPDATED_MARKER)
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_clm {CLM}
            {{WHERE_CLAUSE}} AND {filter}
            {{ORDER_BY}}",
            schema = ctx.schema,
            filter = claim_filter(ctx)
        )
    }
}

/// Claim lines
pub struct ClaimItem;

const CLAIM_ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("clm_uniq_id").primary_key().batch_id().alias(CLM),
    FieldSpec::int("clm_line_num").primary_key().alias(LINE),
    FieldSpec::int("clm_type_cd").alias(CLM),
    FieldSpec::date("clm_from_dt").alias(CLM),
    FieldSpec::text("clm_line_hcpcs_cd")
        .alias(LINE)
        .normalize(Normalization::DefaultString),
    FieldSpec::text("clm_line_ndc_cd")
        .alias(LINE)
        .normalize(Normalization::DefaultString),
    FieldSpec::float("clm_line_sbmt_chrg_amt").nullable().alias(LINE),
    FieldSpec::float("clm_line_cvrd_pd_amt").nullable().alias(LINE),
    FieldSpec::date("clm_line_from_dt")
        .nullable()
        .alias(LINE)
        .normalize(Normalization::DefaultDateToNull),
    FieldSpec::date("clm_line_thru_dt")
        .nullable()
        .alias(LINE)
        .normalize(Normalization::DefaultDateToNull),
    FieldSpec::timestamp("idr_insrt_ts_line")
        .batch_timestamp()
        .insert_exclude()
        .alias(LINE)
        .column_map("idr_insrt_ts")
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_updt_ts_line")
        .update_timestamp()
        .insert_exclude()
        .alias(LINE)
        .column_map("idr_updt_ts")
        .normalize(Normalization::NullDateToMin),
    FieldSpec::date("clm_idr_ld_dt")
        .historical_batch_timestamp()
        .alias(CLM),
];

impl Entity for ClaimItem {
    fn table(&self) -> &'static str {
        "idr.claim_item"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        CLAIM_ITEM_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::Auxiliary
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        ADJUDICATED_PARTITIONS
    }

    fn partition_columns(&self) -> PartitionColumns {
        CLAIM_PARTITION_COLUMNS
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(CLAIM_UPDATED_MARKER)
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_clm {CLM}
            JOIN {schema}.v2_mdcr_clm_line {LINE} ON
                {CLM}.geo_bene_sk = {LINE}.geo_bene_sk AND
                {CLM}.clm_dt_sgntr_sk = {LINE}.clm_dt_sgntr_sk AND
                {CLM}.clm_type_cd = {LINE}.clm_type_cd AND
                {CLM}.clm_num_sk = {LINE}.clm_num_sk
            {{WHERE_CLAUSE}} AND {filter}
            {{ORDER_BY}}",
            schema = ctx.schema,
            filter = claim_filter(ctx)
        )
    }
}

/// Claim date signature
///
/// The signature table carries no trustworthy timestamps of its own, so
/// incremental filtering follows the claim header's timestamps.
pub struct ClaimDateSignature;

const DATE_SIGNATURE_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("clm_dt_sgntr_sk").primary_key().batch_id().alias(SGNTR),
    FieldSpec::date("clm_cms_proc_dt")
        .nullable()
        .alias(SGNTR)
        .normalize(Normalization::DefaultDateToNull),
    FieldSpec::date("clm_submsn_dt")
        .nullable()
        .alias(SGNTR)
        .normalize(Normalization::DefaultDateToNull),
    FieldSpec::date("clm_actv_care_from_dt")
        .nullable()
        .alias(SGNTR)
        .normalize(Normalization::DefaultDateToNull),
];

impl Entity for ClaimDateSignature {
    fn table(&self) -> &'static str {
        "idr.claim_date_signature"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        DATE_SIGNATURE_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::Auxiliary
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        &[]
    }

    fn timestamp_indirection(&self) -> Option<TimestampIndirection> {
        Some(TimestampIndirection {
            table: "v2_mdcr_clm",
            key: "clm_dt_sgntr_sk",
            columns: &["idr_insrt_ts", "idr_updt_ts"],
        })
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_clm_dt_sgntr {SGNTR}
            {{WHERE_CLAUSE}}
            {{ORDER_BY}}",
            schema = ctx.schema
        )
    }
}

/// Part D prescription drug event claims
pub struct ClaimRx;

const CLAIM_RX_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("clm_uniq_id").primary_key().batch_id().alias(CLM),
    FieldSpec::int("clm_type_cd").alias(CLM),
    FieldSpec::int("bene_sk").alias(CLM),
    FieldSpec::text("clm_cntl_num").alias(CLM),
    FieldSpec::text("clm_prnt_cntl_num")
        .alias(CLM)
        .expr("CASE WHEN clm.clm_cntl_num = clm.clm_prnt_cntl_num THEN '' ELSE clm.clm_prnt_cntl_num END")
        .normalize(Normalization::NullString),
    FieldSpec::date("clm_from_dt").alias(CLM),
    FieldSpec::date("clm_thru_dt").alias(CLM),
    FieldSpec::text("clm_ltst_clm_ind").alias(CLM),
    FieldSpec::text("clm_sbmtr_cntrct_num")
        .alias(CLM)
        .normalize(Normalization::DefaultString),
    FieldSpec::float("clm_bene_pmt_amt").nullable().alias(CLM),
    FieldSpec::timestamp("idr_insrt_ts")
        .batch_timestamp()
        .insert_exclude()
        .alias(CLM)
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .insert_exclude()
        .alias(CLM)
        .normalize(Normalization::NullDateToMin),
    FieldSpec::date("clm_idr_ld_dt")
        .historical_batch_timestamp()
        .alias(CLM),
    FieldSpec::text("clm_line_ndc_cd")
        .alias(LINE)
        .normalize(Normalization::DefaultString),
    FieldSpec::float("clm_line_ndc_qty").nullable().alias(LINE),
    FieldSpec::text("clm_line_rx_num")
        .alias(LINE)
        .normalize(Normalization::DefaultString),
    FieldSpec::int("clm_line_days_suply_qty").nullable().alias(RX_LINE),
    FieldSpec::text("clm_brnd_gnrc_cd")
        .alias(RX_LINE)
        .normalize(Normalization::DefaultString),
    FieldSpec::text("clm_daw_prod_slctn_cd")
        .alias(RX_LINE)
        .normalize(Normalization::NullString),
    FieldSpec::timestamp("idr_insrt_ts_line_rx")
        .batch_timestamp()
        .insert_exclude()
        .alias(RX_LINE)
        .column_map("idr_insrt_ts")
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_updt_ts_rx")
        .update_timestamp()
        .insert_exclude()
        .alias(RX_LINE)
        .column_map("idr_updt_ts")
        .normalize(Normalization::NullDateToMin),
];

impl Entity for ClaimRx {
    fn table(&self) -> &'static str {
        "idr.claim_rx"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        CLAIM_RX_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::CoreClaim
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        PART_D_PARTITIONS
    }

    fn partition_columns(&self) -> PartitionColumns {
        CLAIM_PARTITION_COLUMNS
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(UpdatedMarker {
            table: "idr.claim_rx",
            key: "clm_uniq_id",
            columns: &["bfd_claim_updated_ts"],
        })
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_clm {CLM}
            JOIN {schema}.v2_mdcr_clm_line {LINE} ON
                {CLM}.geo_bene_sk = {LINE}.geo_bene_sk AND
                {CLM}.clm_dt_sgntr_sk = {LINE}.clm_dt_sgntr_sk AND
                {CLM}.clm_type_cd = {LINE}.clm_type_cd AND
                {CLM}.clm_num_sk = {LINE}.clm_num_sk
            LEFT JOIN {schema}.v2_mdcr_clm_line_rx {RX_LINE} ON
                {CLM}.geo_bene_sk = {RX_LINE}.geo_bene_sk AND
                {CLM}.clm_dt_sgntr_sk = {RX_LINE}.clm_dt_sgntr_sk AND
                {CLM}.clm_type_cd = {RX_LINE}.clm_type_cd AND
                {CLM}.clm_num_sk = {RX_LINE}.clm_num_sk
            {{WHERE_CLAUSE}} AND {filter}
            {{ORDER_BY}}",
            schema = ctx.schema,
            filter = claim_filter(ctx)
        )
    }
}
