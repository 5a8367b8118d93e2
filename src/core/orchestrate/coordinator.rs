//! Load coordinator - runs the four stages of a load
//!
//! Each stage is planned from the entity registry and executed on the
//! worker pool. A stage starts only after every task of the previous one
//! succeeded. Within a task, extraction and loading are wrapped by the
//! retry policy, which resumes from the checkpoint persisted by the last
//! committed batch.

use super::plan::{PlanSettings, Stage, StagePlanner, Task};
use super::pool::{PoolSettings, TaskRunner, WorkerPool};
use super::summary::{RunSummary, StageSummary};
use crate::adapters::database::traits::{
    CheckpointStore, Destination, SourceConnection, SourceConnector,
};
use crate::config::PipelineConfig;
use crate::core::extract::{Extractor, QueryBuilder, QuerySettings};
use crate::core::load::{BatchConfig, Loader};
use crate::core::partition::{DateInterval, LoadType};
use crate::core::retry::RetryPolicy;
use crate::core::state::{Checkpoint, CheckpointManager};
use crate::domain::{PipelineError, Result};
use crate::log_task_start;
use crate::model::EntityRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Everything that tunes a run
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub query: QuerySettings,
    pub fetch_size: usize,
    pub batch: BatchConfig,
    pub retry: RetryPolicy,
    pub pool: PoolSettings,
    pub interval_override: Option<DateInterval>,
    /// Seed for task ordering; drawn at random per run when unset
    pub shuffle_seed: Option<u64>,
}

impl CoordinatorSettings {
    /// Create settings from a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the partition interval override does not parse.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let interval_override = config
            .pipeline
            .interval_override()
            .map_err(PipelineError::Configuration)?;

        Ok(Self {
            query: QuerySettings {
                schema: config.source.schema.clone(),
                latest_claims: config.pipeline.latest_claims,
                min_claim_load_date: config.pipeline.min_claim_load_date,
                death_date_cutoff_years: config.pipeline.death_date_cutoff_years,
            },
            fetch_size: config.source.fetch_size,
            batch: BatchConfig {
                batch_size: config.pipeline.batch_size,
                enable_checkpoints: config.checkpoints_enabled(),
            },
            retry: RetryPolicy {
                max_errors: config.retry.max_errors,
                window: config.retry.window(),
                delay: config.retry.delay(),
            },
            pool: PoolSettings {
                max_workers: config.pipeline.max_workers,
                max_tasks_per_worker: config.pipeline.max_tasks_per_worker,
            },
            interval_override,
            shuffle_seed: config.pipeline.shuffle_seed,
        })
    }
}

/// Load coordinator
pub struct Coordinator {
    registry: Arc<EntityRegistry>,
    connector: Arc<dyn SourceConnector + Send + Sync>,
    destination: Arc<dyn Destination + Send + Sync>,
    checkpoints: CheckpointManager,
    settings: CoordinatorSettings,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Coordinator {
    /// Create a new coordinator
    ///
    /// # Arguments
    ///
    /// * `registry` - Entities to load
    /// * `connector` - Opens one warehouse connection per worker
    /// * `destination` - Destination store for merged rows
    /// * `checkpoint_store` - Store the tasks resume from; normally backed by
    ///   the same database as `destination`
    /// * `settings` - Run tuning
    pub fn new(
        registry: EntityRegistry,
        connector: Arc<dyn SourceConnector + Send + Sync>,
        destination: Arc<dyn Destination + Send + Sync>,
        checkpoint_store: Arc<dyn CheckpointStore + Send + Sync>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            connector,
            destination,
            checkpoints: CheckpointManager::new_with_store(checkpoint_store),
            settings,
            shutdown: None,
        }
    }

    /// Stop dispatching new tasks once the signal turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Planner for a run starting at `job_start_ts`
    pub fn planner(
        &self,
        load_type: LoadType,
        job_start_ts: DateTime<Utc>,
        seed: u64,
    ) -> StagePlanner<'_> {
        StagePlanner::new(
            &self.registry,
            PlanSettings {
                load_type,
                start_date: self.settings.query.min_claim_load_date,
                today: job_start_ts.date_naive(),
                interval_override: self.settings.interval_override,
                seed,
            },
        )
    }

    /// Execute a load
    ///
    /// This is the main entry point of a run. It:
    /// 1. Ensures the destination schema exists
    /// 2. For each stage that applies to `load_type`:
    ///    - Plans the stage's tasks
    ///    - Runs them on the worker pool
    /// 3. Returns the per-stage summary
    ///
    /// # Errors
    ///
    /// Returns the first fatal task error. Checkpoints of tasks that finished
    /// before it stay committed, so the next run resumes only unfinished work.
    pub async fn run(&self, load_type: LoadType) -> Result<RunSummary> {
        let start_time = Instant::now();
        let job_start_ts = Utc::now();
        let seed = self.settings.shuffle_seed.unwrap_or_else(rand::random);

        tracing::info!(
            load_type = %load_type,
            seed,
            entities = self.registry.len(),
            max_workers = self.settings.pool.max_workers,
            batch_size = self.settings.batch.batch_size,
            checkpoints = self.settings.batch.enable_checkpoints,
            source = self.connector.source_name(),
            destination = self.destination.destination_name(),
            "Starting load"
        );

        self.destination.ensure_schema().await?;

        let planner = self.planner(load_type, job_start_ts, seed);
        let runner: Arc<dyn TaskRunner> = Arc::new(TaskCycle {
            extractor: Extractor::new(
                QueryBuilder::new(self.settings.query.clone()),
                self.settings.fetch_size,
            ),
            loader: Loader::new(self.destination.clone(), self.settings.batch.clone()),
            checkpoints: self.checkpoints.clone(),
            retry: self.settings.retry,
            load_type,
            job_start_ts,
        });
        let mut pool = WorkerPool::new(self.connector.clone(), self.settings.pool);
        if let Some(shutdown) = &self.shutdown {
            pool = pool.with_shutdown(shutdown.clone());
        }

        let mut summary = RunSummary::new(load_type, seed);
        for stage in Stage::ALL {
            if !stage.applies_to(load_type) {
                continue;
            }
            let tasks = planner.plan(stage);
            tracing::info!(stage = stage.number(), tasks = tasks.len(), "Planned {stage}");

            let stage_start = Instant::now();
            let outcomes = pool.execute(tasks, runner.clone()).await.map_err(|e| {
                tracing::error!(stage = stage.number(), error = %e, "Stage failed");
                e
            })?;
            summary.add_stage(StageSummary::from_outcomes(
                stage,
                &outcomes,
                stage_start.elapsed(),
            ));
        }

        let summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }
}

/// Extract and load of one task, with retries
struct TaskCycle {
    extractor: Extractor,
    loader: Loader,
    checkpoints: CheckpointManager,
    retry: RetryPolicy,
    load_type: LoadType,
    job_start_ts: DateTime<Utc>,
}

impl TaskCycle {
    async fn attempt(
        &self,
        conn: &mut dyn SourceConnection,
        task: &Task,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<bool> {
        let stream = self
            .extractor
            .extract(conn, task.entity, &task.partition, checkpoint, self.job_start_ts)
            .await?;
        self.loader
            .load(
                stream,
                task.entity,
                self.job_start_ts,
                &task.partition,
                checkpoint,
                self.load_type,
            )
            .await
    }
}

#[async_trait]
impl TaskRunner for TaskCycle {
    async fn run(&self, conn: &mut dyn SourceConnection, task: &Task) -> Result<bool> {
        log_task_start!(task.table(), task.partition, task.stage.number());

        let mut errors = self.retry.tracker();
        loop {
            // Re-read on every attempt: batches committed before a failure moved it
            let checkpoint = self
                .checkpoints
                .load(task.table(), &task.partition.name)
                .await?;
            match self.attempt(conn, task, checkpoint.as_ref()).await {
                Ok(loaded) => return Ok(loaded),
                Err(err) => {
                    errors
                        .recover(conn, err, task.table(), &task.partition.name)
                        .await?
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{secret_string, DestinationConfig, SourceConfig};
    use crate::config::{ApplicationConfig, LoggingConfig, PipelineSettings, RetryConfig, StateConfig};
    use std::time::Duration;

    fn config() -> PipelineConfig {
        PipelineConfig {
            application: ApplicationConfig::default(),
            source: SourceConfig {
                connection_string: secret_string("postgresql://idr@warehouse/idr".into()),
                schema: "idr_synthetic".into(),
                statement_timeout_seconds: 0,
                connection_timeout_seconds: 30,
                fetch_size: 500,
                ssl_mode: "disable".into(),
            },
            destination: DestinationConfig {
                connection_string: secret_string("postgresql://bfd@localhost/fhirdb".into()),
                max_connections: 4,
                connection_timeout_seconds: 30,
                statement_timeout_seconds: 300,
                ssl_mode: "disable".into(),
            },
            pipeline: PipelineSettings {
                partition_interval: Some("3m".into()),
                shuffle_seed: Some(11),
                ..PipelineSettings::default()
            },
            retry: RetryConfig {
                delay_ms: 250,
                ..RetryConfig::default()
            },
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let settings = CoordinatorSettings::from_config(&config()).unwrap();
        assert_eq!(settings.query.schema, "idr_synthetic");
        assert_eq!(settings.fetch_size, 500);
        assert_eq!(settings.interval_override, Some(DateInterval::Months(3)));
        assert_eq!(settings.retry.delay, Duration::from_millis(250));
        assert_eq!(settings.shuffle_seed, Some(11));
        assert!(settings.batch.enable_checkpoints);
    }

    #[test]
    fn test_invalid_interval_is_a_configuration_error() {
        let mut config = config();
        config.pipeline.partition_interval = Some("fortnight".into());
        assert!(matches!(
            CoordinatorSettings::from_config(&config),
            Err(PipelineError::Configuration(_))
        ));
    }
}
