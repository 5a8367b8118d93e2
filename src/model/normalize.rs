//! Value normalization rules applied while decoding source rows

use crate::domain::value::{SqlValue, ALTERNATE_DEFAULT_DATE, DEFAULT_MAX_DATE, DEFAULT_MIN_DATE};
use serde::{Deserialize, Serialize};

/// Rewrites warehouse sentinel values into the shape the destination expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Normalization {
    /// null → `0001-01-01`
    NullDateToMin,
    /// null → `9999-12-31`
    NullDateToMax,
    /// null, `0001-01-01`, `1000-01-01` → `9999-12-31`
    NullOrDefaultDateToMax,
    /// `0001-01-01`, `1000-01-01`, `9999-12-31` → null
    DefaultDateToNull,
    /// null → `""`
    NullString,
    /// null or `~` → `""`
    DefaultString,
    /// null, `~`, `0` → `""`
    DefaultAndZeroString,
    /// null or `<UNAVAIL>` → `""`
    ProviderName,
    /// null or `00000` → `""`
    DefaultHippsCode,
    /// null → `""`, otherwise trimmed
    TrimString,
    /// null → `0.0`
    NullFloat,
    /// null → `0`
    NullInt,
    /// `0` → null
    DefaultIntToNull,
}

fn is_default_date(value: &SqlValue) -> bool {
    matches!(value.as_date(), Some(d) if d == DEFAULT_MIN_DATE || d == ALTERNATE_DEFAULT_DATE)
}

fn blank_if(value: SqlValue, sentinels: &[&str]) -> SqlValue {
    match value {
        SqlValue::Null => SqlValue::Text(String::new()),
        SqlValue::Text(s) if sentinels.contains(&s.as_str()) => SqlValue::Text(String::new()),
        other => other,
    }
}

/// Keeps timestamps as timestamps when a date sentinel replaces a null
fn sentinel_like(original: &SqlValue, date: chrono::NaiveDate) -> SqlValue {
    match original {
        SqlValue::Timestamp(_) => SqlValue::Timestamp(crate::domain::value::date_to_timestamp(date)),
        _ => SqlValue::Date(date),
    }
}

impl Normalization {
    /// Applies the rule. Values the rule does not recognise pass through unchanged.
    pub fn apply(self, value: SqlValue) -> SqlValue {
        match self {
            Normalization::NullDateToMin => match value {
                SqlValue::Null => SqlValue::Date(DEFAULT_MIN_DATE),
                other => other,
            },
            Normalization::NullDateToMax => match value {
                SqlValue::Null => SqlValue::Date(DEFAULT_MAX_DATE),
                other => other,
            },
            Normalization::NullOrDefaultDateToMax => {
                if value.is_null() || is_default_date(&value) {
                    sentinel_like(&value, DEFAULT_MAX_DATE)
                } else {
                    value
                }
            }
            Normalization::DefaultDateToNull => match value.as_date() {
                Some(d) if d == DEFAULT_MIN_DATE || d == ALTERNATE_DEFAULT_DATE || d == DEFAULT_MAX_DATE => {
                    SqlValue::Null
                }
                _ => value,
            },
            Normalization::NullString => blank_if(value, &[]),
            Normalization::DefaultString => blank_if(value, &["~"]),
            Normalization::DefaultAndZeroString => blank_if(value, &["~", "0"]),
            Normalization::ProviderName => blank_if(value, &["<UNAVAIL>"]),
            Normalization::DefaultHippsCode => blank_if(value, &["00000"]),
            Normalization::TrimString => match value {
                SqlValue::Null => SqlValue::Text(String::new()),
                SqlValue::Text(s) => SqlValue::Text(s.trim().to_string()),
                other => other,
            },
            Normalization::NullFloat => match value {
                SqlValue::Null => SqlValue::Float(0.0),
                other => other,
            },
            Normalization::NullInt => match value {
                SqlValue::Null => SqlValue::Int(0),
                other => other,
            },
            Normalization::DefaultIntToNull => match value {
                SqlValue::Int(0) => SqlValue::Null,
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    fn d(y: i32, m: u32, day: u32) -> SqlValue {
        SqlValue::Date(NaiveDate::from_ymd_opt(y, m, day).unwrap())
    }

    fn t(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test_case(Normalization::NullDateToMin, SqlValue::Null, d(1, 1, 1) ; "null date to min")]
    #[test_case(Normalization::NullDateToMax, SqlValue::Null, d(9999, 12, 31) ; "null date to max")]
    #[test_case(Normalization::NullDateToMax, d(2020, 5, 1), d(2020, 5, 1) ; "real date kept")]
    #[test_case(Normalization::NullOrDefaultDateToMax, d(1000, 1, 1), d(9999, 12, 31) ; "alternate default to max")]
    #[test_case(Normalization::NullOrDefaultDateToMax, d(1, 1, 1), d(9999, 12, 31) ; "min default to max")]
    #[test_case(Normalization::DefaultDateToNull, d(9999, 12, 31), SqlValue::Null ; "max date to null")]
    #[test_case(Normalization::DefaultDateToNull, d(2021, 4, 19), d(2021, 4, 19) ; "real date not nulled")]
    #[test_case(Normalization::NullString, SqlValue::Null, t("") ; "null string")]
    #[test_case(Normalization::DefaultString, t("~"), t("") ; "tilde string")]
    #[test_case(Normalization::DefaultString, t("0"), t("0") ; "zero kept by default string")]
    #[test_case(Normalization::DefaultAndZeroString, t("0"), t("") ; "zero string")]
    #[test_case(Normalization::ProviderName, t("<UNAVAIL>"), t("") ; "unavailable provider")]
    #[test_case(Normalization::DefaultHippsCode, t("00000"), t("") ; "default hipps")]
    #[test_case(Normalization::TrimString, t("  A1 "), t("A1") ; "trim")]
    #[test_case(Normalization::NullFloat, SqlValue::Null, SqlValue::Float(0.0) ; "null float")]
    #[test_case(Normalization::NullInt, SqlValue::Null, SqlValue::Int(0) ; "null int")]
    #[test_case(Normalization::DefaultIntToNull, SqlValue::Int(0), SqlValue::Null ; "zero int to null")]
    #[test_case(Normalization::DefaultIntToNull, SqlValue::Int(7), SqlValue::Int(7) ; "nonzero int kept")]
    fn test_normalization(rule: Normalization, input: SqlValue, expected: SqlValue) {
        assert_eq!(rule.apply(input), expected);
    }

    #[test]
    fn test_default_timestamp_stays_timestamp() {
        let min_ts = SqlValue::Timestamp(crate::domain::value::min_timestamp());
        let out = Normalization::NullOrDefaultDateToMax.apply(min_ts);
        assert!(matches!(out, SqlValue::Timestamp(_)));
    }
}
