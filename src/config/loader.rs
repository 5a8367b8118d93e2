//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{LoadMode, PipelineConfig};
use crate::config::secret_string;
use crate::domain::errors::PipelineError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into PipelineConfig
/// 4. Applies environment variable overrides (IDR_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use idr_pipeline::config::loader::load_config;
///
/// let config = load_config("idr-pipeline.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();

    // Check if file exists
    if !path.exists() {
        return Err(PipelineError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    // Read file contents
    let contents = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Perform environment variable substitution
    let contents = substitute_env_vars(&contents)?;

    // Parse TOML
    let mut config: PipelineConfig = toml::from_str(&contents)
        .map_err(|e| PipelineError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    // Apply environment variable overrides
    apply_env_overrides(&mut config)?;

    // Validate configuration
    config.validate().map_err(|e| {
        PipelineError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Arguments
///
/// * `input` - String containing ${VAR} placeholders
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| PipelineError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    // Process line by line to skip comments
    for line in input.lines() {
        let trimmed = line.trim_start();

        // Skip comment lines - don't process env vars in comments
        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        // Process non-comment lines for env var substitution
        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using IDR_* prefix
///
/// Environment variables follow the pattern: IDR_<SECTION>_<KEY>
/// For example: IDR_SOURCE_SCHEMA, IDR_PIPELINE_MAX_WORKERS
///
/// # Arguments
///
/// * `config` - Mutable reference to the configuration to update
///
/// # Errors
///
/// Returns an error if an override holds a value of the wrong type
fn apply_env_overrides(config: &mut PipelineConfig) -> Result<()> {
    // Application overrides
    if let Some(val) = env_var("IDR_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_var("IDR_APPLICATION_MODE") {
        config.application.mode = parse_mode(&val)?;
    }
    if let Some(val) = env_parse("IDR_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }

    // Source overrides
    if let Some(val) = env_var("IDR_SOURCE_CONNECTION_STRING") {
        config.source.connection_string = secret_string(val);
    }
    if let Some(val) = env_var("IDR_SOURCE_SCHEMA") {
        config.source.schema = val;
    }
    if let Some(val) = env_parse("IDR_SOURCE_FETCH_SIZE")? {
        config.source.fetch_size = val;
    }
    if let Some(val) = env_parse("IDR_SOURCE_STATEMENT_TIMEOUT_SECONDS")? {
        config.source.statement_timeout_seconds = val;
    }

    // Destination overrides
    if let Some(val) = env_var("IDR_DESTINATION_CONNECTION_STRING") {
        config.destination.connection_string = secret_string(val);
    }
    if let Some(val) = env_parse("IDR_DESTINATION_MAX_CONNECTIONS")? {
        config.destination.max_connections = val;
    }

    // Pipeline overrides
    if let Some(val) = env_parse("IDR_PIPELINE_BATCH_SIZE")? {
        config.pipeline.batch_size = val;
    }
    if let Some(val) = env_parse("IDR_PIPELINE_MAX_WORKERS")? {
        config.pipeline.max_workers = val;
    }
    if let Some(val) = env_parse("IDR_PIPELINE_MAX_TASKS_PER_WORKER")? {
        config.pipeline.max_tasks_per_worker = val;
    }
    if let Some(val) = env_var("IDR_PIPELINE_PARTITION_INTERVAL") {
        config.pipeline.partition_interval = Some(val);
    }
    if let Some(val) = env_parse("IDR_PIPELINE_MIN_CLAIM_LOAD_DATE")? {
        config.pipeline.min_claim_load_date = val;
    }
    if let Some(val) = env_parse("IDR_PIPELINE_SHUFFLE_SEED")? {
        config.pipeline.shuffle_seed = Some(val);
    }
    if let Some(val) = env_parse("IDR_PIPELINE_LATEST_CLAIMS")? {
        config.pipeline.latest_claims = val;
    }
    if let Some(val) = env_parse("IDR_PIPELINE_DEATH_DATE_CUTOFF_YEARS")? {
        config.pipeline.death_date_cutoff_years = val;
    }

    // Retry overrides
    if let Some(val) = env_parse("IDR_RETRY_MAX_ERRORS")? {
        config.retry.max_errors = val;
    }
    if let Some(val) = env_parse("IDR_RETRY_ERROR_WINDOW_SECONDS")? {
        config.retry.error_window_seconds = val;
    }
    if let Some(val) = env_parse("IDR_RETRY_DELAY_MS")? {
        config.retry.delay_ms = val;
    }

    // State overrides
    if let Some(val) = env_parse("IDR_STATE_ENABLE_CHECKPOINTS")? {
        config.state.enable_checkpoints = Some(val);
    }

    // Logging overrides
    if let Some(val) = env_parse("IDR_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env_var("IDR_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|val| {
            val.trim().parse().map_err(|e| {
                PipelineError::Configuration(format!("Invalid value '{val}' for {name}: {e}"))
            })
        })
        .transpose()
}

pub fn parse_mode(value: &str) -> Result<LoadMode> {
    match value.to_lowercase().as_str() {
        "production" | "idr" => Ok(LoadMode::Production),
        "synthetic" => Ok(LoadMode::Synthetic),
        "local" => Ok(LoadMode::Local),
        other => Err(PipelineError::Configuration(format!(
            "Invalid application mode '{other}'. Must be one of: production, synthetic, local"
        ))),
    }
}
