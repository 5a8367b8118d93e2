//! Beneficiary entities

use super::{BENEFICIARY_TABLE, NON_CLAIM_PARTITION};
use crate::core::partition::PartitionGroup;
use crate::model::{
    Entity, EntityRole, FieldSpec, Normalization, QueryContext, UpdatedMarker,
};

const HSTRY: &str = "hstry";
const XREF: &str = "xref";

const NON_CLAIM: &[PartitionGroup] = &[NON_CLAIM_PARTITION];

/// Alias of the history view inside [`deceased_bene_filter`]
const DECEASED: &str = "dcsd";

/// `bene_sk`s of beneficiaries verified dead for longer than the cutoff
///
/// Callers exclude these with `NOT EXISTS`, correlating on `dcsd.bene_sk`.
pub fn deceased_bene_filter(ctx: &QueryContext<'_>) -> String {
    format!(
        "SELECT {DECEASED}.bene_sk
            FROM {schema}.v2_mdcr_bene_hstry {DECEASED}
            WHERE {DECEASED}.bene_vrfy_death_day_sw = 'Y'
              AND {DECEASED}.bene_death_dt < CURRENT_DATE - INTERVAL '{years} years'",
        schema = ctx.schema,
        years = ctx.death_date_cutoff_years
    )
}

/// MBIs linked to more than one beneficiary without a trusted cross-reference
///
/// Fully replaced on every run.
pub struct BeneficiaryOvershareMbi;

const OVERSHARE_FIELDS: &[FieldSpec] = &[FieldSpec::text("bene_mbi_id").primary_key().alias(HSTRY)];

impl Entity for BeneficiaryOvershareMbi {
    fn table(&self) -> &'static str {
        "idr.beneficiary_overshare_mbi"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        OVERSHARE_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::Denylist
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        NON_CLAIM
    }

    fn should_replace(&self) -> bool {
        true
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        // HICNs are sometimes reused, so only xrefs confirmed in the xref table are trusted
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_bene_hstry hstry
            {{WHERE_CLAUSE}}
            AND NOT EXISTS (
                SELECT 1
                FROM {schema}.v2_mdcr_bene_xref xref
                WHERE hstry.bene_xref_efctv_sk = xref.bene_sk
                  AND hstry.bene_sk = xref.bene_xref_sk
                  AND xref.bene_kill_cred_cd = '2'
            )
            AND hstry.bene_mbi_id IS NOT NULL
            GROUP BY hstry.bene_mbi_id
            HAVING COUNT(DISTINCT hstry.bene_sk) > 1
            {{ORDER_BY}}",
            schema = ctx.schema
        )
    }
}

/// Beneficiary history joined with its current cross-reference
pub struct Beneficiary;

const BENEFICIARY_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("bene_sk").primary_key().batch_id().alias(HSTRY),
    FieldSpec::int("bene_xref_efctv_sk").alias(HSTRY),
    FieldSpec::text("bene_mbi_id").alias(HSTRY),
    FieldSpec::text("bene_1st_name").alias(HSTRY),
    FieldSpec::text("bene_midl_name")
        .alias(HSTRY)
        .normalize(Normalization::NullString),
    FieldSpec::text("bene_last_name").alias(HSTRY),
    FieldSpec::date("bene_brth_dt").alias(HSTRY),
    FieldSpec::date("bene_death_dt")
        .alias(HSTRY)
        .normalize(Normalization::NullDateToMax),
    FieldSpec::text("bene_vrfy_death_day_sw")
        .alias(HSTRY)
        .normalize(Normalization::DefaultString),
    FieldSpec::text("bene_sex_cd").alias(HSTRY),
    FieldSpec::text("bene_race_cd")
        .alias(HSTRY)
        .normalize(Normalization::DefaultString),
    FieldSpec::text("geo_usps_state_cd")
        .alias(HSTRY)
        .normalize(Normalization::DefaultString),
    FieldSpec::text("geo_zip5_cd")
        .alias(HSTRY)
        .normalize(Normalization::DefaultString),
    FieldSpec::text("bene_line_1_adr")
        .alias(HSTRY)
        .normalize(Normalization::NullString),
    FieldSpec::text("idr_ltst_trans_flg")
        .alias(HSTRY)
        .normalize(Normalization::NullString),
    FieldSpec::timestamp("idr_trans_efctv_ts")
        .primary_key()
        .alias(HSTRY),
    FieldSpec::timestamp("idr_trans_obslt_ts").alias(HSTRY),
    FieldSpec::timestamp("idr_insrt_ts_bene")
        .batch_timestamp()
        .alias(HSTRY)
        .column_map("idr_insrt_ts"),
    FieldSpec::timestamp("idr_updt_ts_bene")
        .update_timestamp()
        .alias(HSTRY)
        .column_map("idr_updt_ts")
        .normalize(Normalization::NullDateToMin),
    FieldSpec::text("bene_kill_cred_cd")
        .alias(XREF)
        .normalize(Normalization::DefaultString),
    FieldSpec::timestamp("src_rec_updt_ts")
        .alias(XREF)
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_insrt_ts_xref")
        .batch_timestamp()
        .alias(XREF)
        .column_map("idr_insrt_ts")
        .normalize(Normalization::NullDateToMin),
    FieldSpec::timestamp("idr_updt_ts_xref")
        .update_timestamp()
        .alias(XREF)
        .column_map("idr_updt_ts")
        .normalize(Normalization::NullDateToMin),
];

impl Entity for Beneficiary {
    fn table(&self) -> &'static str {
        BENEFICIARY_TABLE
    }

    fn fields(&self) -> &'static [FieldSpec] {
        BENEFICIARY_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::CoreBeneficiary
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        NON_CLAIM
    }

    fn computed_columns(&self) -> &'static [&'static str] {
        &["bene_xref_efctv_sk_computed"]
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(UpdatedMarker {
            table: BENEFICIARY_TABLE,
            key: "bene_sk",
            columns: &["bfd_patient_updated_ts"],
        })
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        // Several xref rows can exist per bene_sk/bene_xref_sk pair; keep the most recently updated.
        // The xref join is mirrored: bene_sk and bene_xref_sk swap roles in that table.
        format!(
            "WITH ordered_xref AS (
                SELECT bene_sk, bene_xref_sk, bene_kill_cred_cd, src_rec_updt_ts,
                    idr_insrt_ts, idr_updt_ts,
                    ROW_NUMBER() OVER (
                        PARTITION BY bene_sk, bene_xref_sk
                        ORDER BY src_rec_updt_ts DESC
                    ) AS row_order
                FROM {schema}.v2_mdcr_bene_xref
            ),
            deceased_benes AS (
                {deceased}
            )
            SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_bene_hstry {HSTRY}
            LEFT JOIN ordered_xref {XREF}
                ON {XREF}.bene_sk = {HSTRY}.bene_xref_sk
                AND {XREF}.bene_xref_sk = {HSTRY}.bene_sk
                AND {XREF}.row_order = 1
            {{WHERE_CLAUSE}}
            AND {HSTRY}.bene_mbi_id IS NOT NULL
            AND NOT EXISTS (SELECT 1 FROM deceased_benes db WHERE db.bene_sk = {HSTRY}.bene_sk)
            {{ORDER_BY}}",
            schema = ctx.schema,
            deceased = deceased_bene_filter(ctx)
        )
    }
}

/// MBI history per beneficiary identifier
pub struct BeneficiaryMbiId;

const MBI_ID_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("bene_mbi_id").primary_key(),
    FieldSpec::date("bene_mbi_efctv_dt"),
    FieldSpec::date("bene_mbi_obslt_dt").normalize(Normalization::NullDateToMax),
    FieldSpec::text("idr_ltst_trans_flg").normalize(Normalization::NullString),
    FieldSpec::timestamp("idr_trans_efctv_ts").primary_key(),
    FieldSpec::timestamp("idr_trans_obslt_ts"),
    FieldSpec::timestamp("idr_insrt_ts").batch_timestamp(),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .normalize(Normalization::NullDateToMin),
];

impl Entity for BeneficiaryMbiId {
    fn table(&self) -> &'static str {
        "idr.beneficiary_mbi_id"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        MBI_ID_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::Auxiliary
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        NON_CLAIM
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(UpdatedMarker {
            table: BENEFICIARY_TABLE,
            key: "bene_mbi_id",
            columns: &["bfd_patient_updated_ts"],
        })
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_bene_mbi_id
            {{WHERE_CLAUSE}}
            {{ORDER_BY}}",
            schema = ctx.schema
        )
    }
}

/// Third-party (buy-in) coverage periods
pub struct BeneficiaryThirdParty;

const THIRD_PARTY_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("bene_sk").primary_key().batch_id(),
    FieldSpec::text("bene_buyin_cd").normalize(Normalization::DefaultString),
    FieldSpec::text("bene_tp_type_cd").primary_key(),
    FieldSpec::date("bene_rng_bgn_dt").primary_key(),
    FieldSpec::date("bene_rng_end_dt").primary_key(),
    FieldSpec::text("idr_ltst_trans_flg").normalize(Normalization::NullString),
    FieldSpec::timestamp("idr_insrt_ts").batch_timestamp(),
    FieldSpec::timestamp("idr_trans_efctv_ts").primary_key(),
    FieldSpec::timestamp("idr_trans_obslt_ts"),
    FieldSpec::timestamp("idr_updt_ts")
        .update_timestamp()
        .normalize(Normalization::NullDateToMin),
];

impl Entity for BeneficiaryThirdParty {
    fn table(&self) -> &'static str {
        "idr.beneficiary_third_party"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        THIRD_PARTY_FIELDS
    }

    fn role(&self) -> EntityRole {
        EntityRole::Auxiliary
    }

    fn partition_groups(&self) -> &'static [PartitionGroup] {
        NON_CLAIM
    }

    fn updated_marker(&self) -> Option<UpdatedMarker> {
        Some(UpdatedMarker {
            table: BENEFICIARY_TABLE,
            key: "bene_sk",
            columns: &[
                "bfd_part_a_coverage_updated_ts",
                "bfd_part_b_coverage_updated_ts",
            ],
        })
    }

    fn fetch_query(&self, ctx: &QueryContext<'_>) -> String {
        format!(
            "SELECT {{COLUMNS}}
            FROM {schema}.v2_mdcr_bene_tp tp
            {{WHERE_CLAUSE}}
            AND NOT EXISTS ({deceased} AND {DECEASED}.bene_sk = tp.bene_sk)
            {{ORDER_BY}}",
            schema = ctx.schema,
            deceased = deceased_bene_filter(ctx)
        )
    }
}
