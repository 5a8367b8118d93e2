//! Typed column values exchanged between source, loader and destination

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default "minimum" date the warehouse uses in place of null
pub const DEFAULT_MIN_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1, 1, 1) {
    Some(d) => d,
    None => unreachable!(),
};

/// Default "maximum" date the warehouse uses for open-ended ranges
pub const DEFAULT_MAX_DATE: NaiveDate = match NaiveDate::from_ymd_opt(9999, 12, 31) {
    Some(d) => d,
    None => unreachable!(),
};

/// Alternate default date found in older warehouse extracts
pub const ALTERNATE_DEFAULT_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1000, 1, 1) {
    Some(d) => d,
    None => unreachable!(),
};

/// Midnight UTC of [`DEFAULT_MIN_DATE`]; the lowest possible cursor value
pub fn min_timestamp() -> DateTime<Utc> {
    date_to_timestamp(DEFAULT_MIN_DATE)
}

/// Converts a calendar date to midnight UTC
pub fn date_to_timestamp(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Name of the variant, used in decode error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Date(_) => "date",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::Timestamp(ts) => Some(ts.date_naive()),
            _ => None,
        }
    }

    /// Timestamp view of the value; dates are treated as midnight UTC
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::Timestamp(ts) => Some(*ts),
            SqlValue::Date(d) => Some(date_to_timestamp(*d)),
            _ => None,
        }
    }

    /// Removes NUL bytes, which PostgreSQL rejects in text columns
    pub fn strip_nul(self) -> Self {
        match self {
            SqlValue::Text(s) if s.contains('\0') => SqlValue::Text(s.replace('\0', "")),
            other => other,
        }
    }

    /// Renders the value as a SQL literal
    ///
    /// Text is single-quoted with embedded quotes doubled; temporal values are
    /// cast explicitly so comparisons against typed columns stay sargable.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => format!("{v:?}"),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            SqlValue::Timestamp(ts) => timestamp_literal(*ts),
        }
    }

    /// Renders the value in PostgreSQL `COPY ... FROM STDIN` text format
    pub fn write_copy_text(&self, out: &mut String) {
        match self {
            SqlValue::Null => out.push_str("\\N"),
            SqlValue::Bool(b) => out.push(if *b { 't' } else { 'f' }),
            SqlValue::Int(v) => out.push_str(&v.to_string()),
            SqlValue::Float(v) => out.push_str(&format!("{v:?}")),
            SqlValue::Text(s) => {
                for ch in s.chars() {
                    match ch {
                        '\\' => out.push_str("\\\\"),
                        '\t' => out.push_str("\\t"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\0' => {}
                        c => out.push(c),
                    }
                }
            }
            SqlValue::Date(d) => out.push_str(&d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(ts) => {
                out.push_str(&ts.format("%Y-%m-%d %H:%M:%S%.6f+00").to_string())
            }
        }
    }
}

/// Renders a UTC timestamp as a typed SQL literal
pub fn timestamp_literal(ts: DateTime<Utc>) -> String {
    format!(
        "TIMESTAMPTZ '{}'",
        ts.format("%Y-%m-%d %H:%M:%S%.6f+00")
    )
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::Date(d) => write!(f, "{d}"),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_literal_escapes_quotes() {
        let v = SqlValue::from("O'Brien");
        assert_eq!(v.to_sql_literal(), "'O''Brien'");
    }

    #[test]
    fn test_timestamp_literal() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            SqlValue::from(ts).to_sql_literal(),
            "TIMESTAMPTZ '2024-05-01 12:30:00.000000+00'"
        );
    }

    #[test]
    fn test_date_as_timestamp_is_midnight() {
        let d = NaiveDate::from_ymd_opt(2021, 4, 19).unwrap();
        let ts = SqlValue::Date(d).as_timestamp().unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2021, 4, 19, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_strip_nul() {
        let v = SqlValue::from("ab\0c").strip_nul();
        assert_eq!(v, SqlValue::from("abc"));
    }

    #[test]
    fn test_copy_text_escaping() {
        let mut out = String::new();
        SqlValue::from("a\tb\\c\nd").write_copy_text(&mut out);
        assert_eq!(out, "a\\tb\\\\c\\nd");

        let mut out = String::new();
        SqlValue::Null.write_copy_text(&mut out);
        assert_eq!(out, "\\N");
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<i64> = None;
        assert!(SqlValue::from(none).is_null());
        assert_eq!(SqlValue::from(Some(4_i64)), SqlValue::Int(4));
    }
}
