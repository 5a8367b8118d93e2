//! Bounded worker pool
//!
//! A stage's tasks are drained from a shared queue by at most `max_workers`
//! tokio tasks. Each worker owns one source connection, opened lazily and
//! replaced after `max_tasks_per_worker` tasks. The first failure stops
//! dispatch; workers finish the task they are running and exit.

use super::plan::{Stage, Task};
use crate::adapters::database::traits::{SourceConnection, SourceConnector};
use crate::domain::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

/// Runs one task on a worker's connection
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Extract and load one task
    ///
    /// # Returns
    ///
    /// `true` if the task loaded any rows.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the run.
    async fn run(&self, conn: &mut dyn SourceConnection, task: &Task) -> Result<bool>;
}

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_workers: usize,
    /// Tasks served per connection before it is replaced; 0 keeps it forever
    pub max_tasks_per_worker: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_tasks_per_worker: 0,
        }
    }
}

/// What a finished task reports
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub table: &'static str,
    pub partition: String,
    pub stage: Stage,
    pub loaded: bool,
    pub elapsed: Duration,
}

/// Executes task lists with a bounded number of workers
#[derive(Clone)]
pub struct WorkerPool {
    connector: Arc<dyn SourceConnector + Send + Sync>,
    settings: PoolSettings,
    shutdown: Option<watch::Receiver<bool>>,
}

struct WorkerShared {
    queue: Mutex<VecDeque<Task>>,
    abort: AtomicBool,
}

impl WorkerPool {
    pub fn new(connector: Arc<dyn SourceConnector + Send + Sync>, settings: PoolSettings) -> Self {
        Self {
            connector,
            settings,
            shutdown: None,
        }
    }

    /// Stop dispatching new tasks once the signal turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Run every task and wait for the workers to finish
    ///
    /// # Returns
    ///
    /// One outcome per task, in completion order.
    ///
    /// # Errors
    ///
    /// Returns the first task failure, wrapped with its table and partition,
    /// or [`PipelineError::Interrupted`] if a shutdown left tasks unrun.
    pub async fn execute(
        &self,
        tasks: Vec<Task>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Vec<TaskOutcome>> {
        let total = tasks.len();
        let workers = self.settings.max_workers.max(1).min(total);
        let shared = Arc::new(WorkerShared {
            queue: Mutex::new(tasks.into()),
            abort: AtomicBool::new(false),
        });

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            set.spawn(worker(
                worker_id,
                shared.clone(),
                self.connector.clone(),
                runner.clone(),
                self.settings.max_tasks_per_worker,
                self.shutdown.clone(),
            ));
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut first_error: Option<PipelineError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(done)) => outcomes.extend(done),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    shared.abort.store(true, Ordering::SeqCst);
                    first_error.get_or_insert(PipelineError::Other(format!(
                        "Worker terminated unexpectedly: {join_err}"
                    )));
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        let remaining = shared.queue.lock().await.len();
        if remaining > 0 {
            return Err(PipelineError::Interrupted(format!(
                "{remaining} of {total} tasks were not started"
            )));
        }
        Ok(outcomes)
    }
}

fn shutdown_requested(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

async fn worker(
    worker_id: usize,
    shared: Arc<WorkerShared>,
    connector: Arc<dyn SourceConnector + Send + Sync>,
    runner: Arc<dyn TaskRunner>,
    max_tasks_per_worker: usize,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<Vec<TaskOutcome>> {
    let mut conn: Option<Box<dyn SourceConnection>> = None;
    let mut served = 0usize;
    let mut outcomes = Vec::new();

    loop {
        if shared.abort.load(Ordering::SeqCst) || shutdown_requested(&shutdown) {
            break;
        }
        let Some(task) = shared.queue.lock().await.pop_front() else {
            break;
        };

        if max_tasks_per_worker > 0 && served >= max_tasks_per_worker {
            tracing::debug!(worker_id, served, "Recycling source connection");
            conn = None;
            served = 0;
        }
        let mut connection = match conn.take() {
            Some(c) => c,
            None => match connector.connect().await {
                Ok(c) => c,
                Err(err) => {
                    shared.abort.store(true, Ordering::SeqCst);
                    return Err(err.in_task(task.table(), &task.partition.name));
                }
            },
        };

        let started = Instant::now();
        let result = runner.run(connection.as_mut(), &task).await;
        conn = Some(connection);
        match result {
            Ok(loaded) => outcomes.push(TaskOutcome {
                table: task.table(),
                partition: task.partition.name.clone(),
                stage: task.stage,
                loaded,
                elapsed: started.elapsed(),
            }),
            Err(err) => {
                shared.abort.store(true, Ordering::SeqCst);
                tracing::error!(
                    worker_id,
                    table = task.table(),
                    partition = %task.partition,
                    error = %err,
                    "Task failed, stopping dispatch"
                );
                return Err(err.in_task(task.table(), &task.partition.name));
            }
        }
        served += 1;
    }

    Ok(outcomes)
}
