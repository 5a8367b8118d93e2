//! Row decoding: normalization, type coercion, nullability and cursor extraction

use super::entity::{Entity, EntityExt};
use super::field::{FieldSpec, FieldType};
use crate::domain::record::{Cursor, RawRow, Record, BATCH_ID_COLUMN, CURSOR_TS_COLUMN};
use crate::domain::value::SqlValue;
use crate::domain::{PipelineError, Result};

fn coerce(field: &FieldSpec, value: SqlValue) -> std::result::Result<SqlValue, String> {
    match (field.field_type, value) {
        (_, SqlValue::Null) => Ok(SqlValue::Null),
        (FieldType::Int, v @ SqlValue::Int(_)) => Ok(v),
        (FieldType::Float, v @ SqlValue::Float(_)) => Ok(v),
        (FieldType::Float, SqlValue::Int(i)) => Ok(SqlValue::Float(i as f64)),
        (FieldType::Text, v @ SqlValue::Text(_)) => Ok(v.strip_nul()),
        (FieldType::Date, v @ SqlValue::Date(_)) => Ok(v),
        (FieldType::Date, SqlValue::Timestamp(ts)) => Ok(SqlValue::Date(ts.date_naive())),
        (FieldType::Timestamp, v @ SqlValue::Timestamp(_)) => Ok(v),
        (FieldType::Timestamp, SqlValue::Date(d)) => {
            Ok(SqlValue::Timestamp(crate::domain::value::date_to_timestamp(d)))
        }
        (FieldType::Bool, v @ SqlValue::Bool(_)) => Ok(v),
        (expected, other) => Err(format!(
            "expected {expected}, got {}",
            other.type_name()
        )),
    }
}

/// Decodes one source row into a [`Record`] in the entity's field order
///
/// Every field's normalization is applied before the type and nullability
/// checks. The cursor is read from the `_cursor_ts` and `_batch_id` columns
/// the query builder adds.
///
/// # Errors
///
/// Returns [`PipelineError::Decode`] naming the table and column on a
/// missing column, a type mismatch or an unexpected null.
pub fn decode_row(entity: &dyn Entity, mut row: RawRow) -> Result<Record> {
    let table = entity.table();
    let mut values = Vec::with_capacity(entity.fields().len());

    for field in entity.fields() {
        let raw = row
            .remove(field.name)
            .ok_or_else(|| PipelineError::decode(table, field.name, "column missing from result set"))?;
        let normalized = match field.normalization {
            Some(rule) => rule.apply(raw),
            None => raw,
        };
        let value =
            coerce(field, normalized).map_err(|msg| PipelineError::decode(table, field.name, msg))?;
        if value.is_null() && !field.nullable {
            return Err(PipelineError::decode(table, field.name, "unexpected null"));
        }
        values.push(value);
    }

    let cursor = if entity.has_cursor() {
        let ts = row
            .get(CURSOR_TS_COLUMN)
            .and_then(SqlValue::as_timestamp)
            .ok_or_else(|| PipelineError::decode(table, CURSOR_TS_COLUMN, "missing cursor timestamp"))?;
        let id = match row.get(BATCH_ID_COLUMN) {
            None | Some(SqlValue::Null) => 0,
            Some(SqlValue::Int(id)) => *id,
            Some(other) => {
                return Err(PipelineError::decode(
                    table,
                    BATCH_ID_COLUMN,
                    format!("expected int, got {}", other.type_name()),
                ))
            }
        };
        Some(Cursor::new(ts, id))
    } else {
        None
    };

    Ok(Record::new(values, cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partition::PartitionGroup;
    use crate::model::{EntityRole, Normalization, QueryContext};
    use chrono::{TimeZone, Utc};

    struct Bene;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::int("bene_sk").primary_key().batch_id(),
        FieldSpec::text("bene_midl_name").normalize(Normalization::NullString),
        FieldSpec::float("bene_amt"),
        FieldSpec::timestamp("idr_updt_ts")
            .update_timestamp()
            .normalize(Normalization::NullDateToMin),
    ];

    impl Entity for Bene {
        fn table(&self) -> &'static str {
            "idr.beneficiary_test"
        }
        fn fields(&self) -> &'static [FieldSpec] {
            FIELDS
        }
        fn role(&self) -> EntityRole {
            EntityRole::Auxiliary
        }
        fn partition_groups(&self) -> &'static [PartitionGroup] {
            &[]
        }
        fn fetch_query(&self, _ctx: &QueryContext<'_>) -> String {
            String::new()
        }
    }

    fn row() -> RawRow {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        RawRow::from([
            ("bene_sk".to_string(), SqlValue::Int(10)),
            ("bene_midl_name".to_string(), SqlValue::Null),
            ("bene_amt".to_string(), SqlValue::Int(3)),
            ("idr_updt_ts".to_string(), SqlValue::Null),
            (CURSOR_TS_COLUMN.to_string(), SqlValue::Timestamp(ts)),
            (BATCH_ID_COLUMN.to_string(), SqlValue::Int(10)),
        ])
    }

    #[test]
    fn test_decode_normalizes_and_coerces() {
        let record = decode_row(&Bene, row()).unwrap();
        assert_eq!(record.values[1], SqlValue::Text(String::new()));
        assert_eq!(record.values[2], SqlValue::Float(3.0));
        assert_eq!(
            record.values[3],
            SqlValue::Timestamp(crate::domain::value::min_timestamp())
        );
        assert_eq!(record.cursor.unwrap().id, 10);
    }

    #[test]
    fn test_decode_rejects_unexpected_null() {
        let mut raw = row();
        raw.insert("bene_sk".to_string(), SqlValue::Null);
        let err = decode_row(&Bene, raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Decode error in idr.beneficiary_test.bene_sk: unexpected null"
        );
    }

    #[test]
    fn test_decode_rejects_type_mismatch() {
        let mut raw = row();
        raw.insert("bene_sk".to_string(), SqlValue::Text("x".into()));
        let err = decode_row(&Bene, raw).unwrap_err();
        assert!(err.to_string().contains("expected int, got text"));
    }

    #[test]
    fn test_decode_requires_cursor_column() {
        let mut raw = row();
        raw.remove(CURSOR_TS_COLUMN);
        assert!(matches!(
            decode_row(&Bene, raw),
            Err(PipelineError::Decode { .. })
        ));
    }
}
