//! Extraction: query construction and streaming decode

pub mod extractor;
pub mod query;

pub use extractor::{Extractor, RecordStream, DEFAULT_FETCH_SIZE};
pub use query::{ExtractQuery, QueryBuilder, QuerySettings};
