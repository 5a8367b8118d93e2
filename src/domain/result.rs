//! Result type alias for the pipeline

use super::errors::PipelineError;

/// Result type alias for pipeline operations
///
/// # Examples
///
/// ```
/// use idr_pipeline::domain::result::Result;
/// use idr_pipeline::domain::errors::PipelineError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(PipelineError::Configuration("missing source".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, PipelineError>;
