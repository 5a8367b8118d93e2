//! Run summary and reporting

use super::plan::Stage;
use super::pool::TaskOutcome;
use crate::core::partition::LoadType;
use std::time::Duration;

/// Result of one stage
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub stage: Stage,
    /// Tasks planned and completed
    pub tasks: usize,
    /// Tasks that committed at least one row
    pub tasks_loaded: usize,
    pub duration: Duration,
}

impl StageSummary {
    pub fn from_outcomes(stage: Stage, outcomes: &[TaskOutcome], duration: Duration) -> Self {
        Self {
            stage,
            tasks: outcomes.len(),
            tasks_loaded: outcomes.iter().filter(|o| o.loaded).count(),
            duration,
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub load_type: LoadType,
    pub seed: u64,
    pub stages: Vec<StageSummary>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(load_type: LoadType, seed: u64) -> Self {
        Self {
            load_type,
            seed,
            stages: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn add_stage(&mut self, stage: StageSummary) {
        self.stages.push(stage);
    }

    pub fn total_tasks(&self) -> usize {
        self.stages.iter().map(|s| s.tasks).sum()
    }

    pub fn tasks_loaded(&self) -> usize {
        self.stages.iter().map(|s| s.tasks_loaded).sum()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Log the summary
    pub fn log_summary(&self) {
        for stage in &self.stages {
            tracing::info!(
                stage = stage.stage.number(),
                tasks = stage.tasks,
                tasks_loaded = stage.tasks_loaded,
                duration_ms = stage.duration.as_millis() as u64,
                "Stage summary"
            );
        }
        tracing::info!(
            load_type = %self.load_type,
            seed = self.seed,
            total_tasks = self.total_tasks(),
            tasks_loaded = self.tasks_loaded(),
            duration_secs = self.duration.as_secs(),
            "Load completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(loaded: bool) -> TaskOutcome {
        TaskOutcome {
            table: "idr.claim",
            partition: "pac".to_string(),
            stage: Stage::CoreClaims,
            loaded,
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_totals_across_stages() {
        let mut summary = RunSummary::new(LoadType::Incremental, 9);
        summary.add_stage(StageSummary::from_outcomes(
            Stage::Denylist,
            &[outcome(true)],
            Duration::from_secs(1),
        ));
        summary.add_stage(StageSummary::from_outcomes(
            Stage::CoreClaims,
            &[outcome(true), outcome(false), outcome(false)],
            Duration::from_secs(2),
        ));

        assert_eq!(summary.total_tasks(), 4);
        assert_eq!(summary.tasks_loaded(), 2);
        assert_eq!(summary.stage(Stage::CoreClaims).unwrap().tasks_loaded, 1);
        assert!(summary.stage(Stage::CoreBeneficiary).is_none());
    }
}
