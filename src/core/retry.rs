//! Retry and reconnect policy for transient source failures
//!
//! A task that hits a transient connector error reconnects, waits and runs
//! again from its last persisted checkpoint. Errors are counted in a sliding
//! window: once `max_errors` have been counted without a quiet gap of at
//! least `window`, the next one is fatal.

use crate::adapters::database::traits::SourceConnection;
use crate::domain::{PipelineError, Result};
use crate::log_retry_attempt;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_ERRORS: u32 = 3;
pub const DEFAULT_ERROR_WINDOW: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Limits applied to one task's retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Errors tolerated inside one window
    pub max_errors: u32,
    /// Quiet period after which the counter resets
    pub window: Duration,
    /// Pause between reconnecting and running the task again
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            window: DEFAULT_ERROR_WINDOW,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Fresh error counter for one task
    pub fn tracker(&self) -> ErrorWindow {
        ErrorWindow {
            policy: *self,
            count: 0,
            last_error: None,
        }
    }
}

/// Per-task error counter
#[derive(Debug, Clone)]
pub struct ErrorWindow {
    policy: RetryPolicy,
    count: u32,
    last_error: Option<Instant>,
}

impl ErrorWindow {
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Count an error and decide whether the task may run again
    ///
    /// # Returns
    ///
    /// The attempt number of the retry that is about to happen.
    ///
    /// # Errors
    ///
    /// Returns `err` itself when it is not transient or the budget is spent.
    pub fn admit(&mut self, err: PipelineError) -> Result<u32> {
        if !err.is_transient() {
            return Err(err);
        }

        let now = Instant::now();
        if let Some(last) = self.last_error {
            if now.duration_since(last) >= self.policy.window {
                self.count = 0;
            }
        }
        if self.count >= self.policy.max_errors {
            tracing::error!(
                errors = self.count + 1,
                window_secs = self.policy.window.as_secs(),
                "Retry budget exhausted"
            );
            return Err(err);
        }

        self.count += 1;
        self.last_error = Some(now);
        Ok(self.count)
    }

    /// Handle a failed task run: count the error, reconnect and wait
    ///
    /// # Arguments
    ///
    /// * `conn` - The task's source connection
    /// * `err` - The error the run failed with
    /// * `table` / `partition` - Task identity for logging
    ///
    /// # Errors
    ///
    /// Returns the original error when it must not be retried, or the
    /// reconnect failure.
    pub async fn recover(
        &mut self,
        conn: &mut dyn SourceConnection,
        err: PipelineError,
        table: &str,
        partition: &str,
    ) -> Result<()> {
        let reason = err.to_string();
        let attempt = self.admit(err)?;
        log_retry_attempt!(table, partition, attempt, self.policy.max_errors, reason);

        conn.reconnect().await?;
        tokio::time::sleep(self.policy.delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::traits::SourceConnector;
    use crate::adapters::memory::MemoryWarehouse;
    use crate::domain::SourceError;

    fn transient() -> PipelineError {
        SourceError::ReauthenticationRequired("token expired".into()).into()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_error_inside_window_is_fatal() {
        let mut tracker = RetryPolicy::default().tracker();
        for expected in 1..=3 {
            assert_eq!(tracker.admit(transient()).unwrap(), expected);
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        let err = tracker.admit(transient()).unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_errors_never_exhaust() {
        let mut tracker = RetryPolicy::default().tracker();
        for _ in 0..6 {
            assert_eq!(tracker.admit(transient()).unwrap(), 1);
            tokio::time::advance(Duration::from_secs(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_is_raised_immediately() {
        let mut tracker = RetryPolicy::default().tracker();
        let err = tracker
            .admit(PipelineError::Checkpoint("unreachable".into()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Checkpoint(_)));
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_reconnects_and_waits() {
        let warehouse = MemoryWarehouse::new();
        let mut conn = warehouse.connect().await.unwrap();
        let mut tracker = RetryPolicy::default().tracker();

        let started = Instant::now();
        tracker
            .recover(conn.as_mut(), transient(), "idr.claim", "pac")
            .await
            .unwrap();
        assert!(started.elapsed() >= DEFAULT_RETRY_DELAY);
        assert_eq!(warehouse.reconnect_count().await, 1);

        let err = SourceError::Query("relation does not exist".into()).into();
        assert!(tracker
            .recover(conn.as_mut(), err, "idr.claim", "pac")
            .await
            .is_err());
        assert_eq!(warehouse.reconnect_count().await, 1);
    }
}
