//! Domain types shared by every layer of the pipeline.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Column values** ([`SqlValue`]) exchanged between source, loader and destination
//! - **Records** ([`Record`], [`Cursor`], [`RawRow`])
//! - **Error types** ([`PipelineError`], [`SourceError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, PipelineError>`]:
//!
//! ```rust,no_run
//! use idr_pipeline::domain::{PipelineError, Result};
//!
//! fn example() -> Result<()> {
//!     let _config = idr_pipeline::config::load_config("idr-pipeline.toml")?;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod record;
pub mod result;
pub mod value;

pub use errors::{PipelineError, SourceError};
pub use record::{Cursor, RawRow, Record, RecordBatch, BATCH_ID_COLUMN, CURSOR_TS_COLUMN};
pub use result::Result;
pub use value::{SqlValue, DEFAULT_MAX_DATE, DEFAULT_MIN_DATE};
