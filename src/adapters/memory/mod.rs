//! In-memory source and destination
//!
//! Backs dry runs and tests. The warehouse evaluates extract queries
//! natively instead of parsing SQL; the store applies the destination merge
//! rules to plain row maps.

pub mod source;
pub mod store;

pub use source::{MemorySourceConnection, MemoryWarehouse};
pub use store::{MemoryStore, StoredRow};

use crate::domain::SqlValue;
use std::cmp::Ordering;

/// Total order over column values: nulls first, temporal values compared as instants
pub(crate) fn compare_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    use SqlValue::*;
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (Int(x), Int(y)) => x.cmp(y),
        (Float(x), Float(y)) => x.total_cmp(y),
        (Int(x), Float(y)) => (*x as f64).total_cmp(y),
        (Float(x), Int(y)) => x.total_cmp(&(*y as f64)),
        (Text(x), Text(y)) => x.cmp(y),
        (Date(_) | Timestamp(_), Date(_) | Timestamp(_)) => a.as_timestamp().cmp(&b.as_timestamp()),
        _ => a.type_name().cmp(b.type_name()),
    }
}
