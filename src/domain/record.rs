//! Source rows and decoded records

use super::value::SqlValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A row as returned by a source connection, keyed by column alias
pub type RawRow = BTreeMap<String, SqlValue>;

/// A batch of decoded records, in source order
pub type RecordBatch = Vec<Record>;

/// Column alias carrying the row's cursor timestamp in extract queries
pub const CURSOR_TS_COLUMN: &str = "_cursor_ts";

/// Column alias carrying the row's batch id in extract queries
pub const BATCH_ID_COLUMN: &str = "_batch_id";

/// The `(ts, id)` pair used for ordering and resumption
///
/// Ordering is lexicographic: timestamp first, batch id as tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub ts: DateTime<Utc>,
    pub id: i64,
}

impl Cursor {
    pub fn new(ts: DateTime<Utc>, id: i64) -> Self {
        Self { ts, id }
    }
}

/// A decoded, normalized row
///
/// `values` follow the entity's field order. `cursor` is absent for entities
/// without timestamp fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<SqlValue>,
    pub cursor: Option<Cursor>,
}

impl Record {
    pub fn new(values: Vec<SqlValue>, cursor: Option<Cursor>) -> Self {
        Self { values, cursor }
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_ordering_breaks_ties_on_id() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        assert!(Cursor::new(ts, 5) < Cursor::new(ts, 6));
        assert!(Cursor::new(ts, 99) < Cursor::new(later, 1));
        assert_eq!(Cursor::new(ts, 5), Cursor::new(ts, 5));
    }
}
