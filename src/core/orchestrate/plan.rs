//! Stage planning
//!
//! Turns the entity registry into the ordered task list of one stage. The
//! order is a seeded shuffle followed by a stable sort on partition
//! priority, so equal-priority work is spread across entities while runs
//! with the same seed plan identically.

use crate::core::partition::{DateInterval, LoadType, Partition};
use crate::model::{Entity, EntityExt, EntityRegistry, EntityRole};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;

/// The four dependency-ordered stages of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Stage {
    /// Denylist refresh
    Denylist,
    /// Every entity for initial loads, auxiliary entities for incremental ones
    Entities,
    /// Core claims re-expanded across their partitions
    CoreClaims,
    /// Final unbounded refresh of the core beneficiary
    CoreBeneficiary,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Denylist,
        Stage::Entities,
        Stage::CoreClaims,
        Stage::CoreBeneficiary,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Stage::Denylist => 1,
            Stage::Entities => 2,
            Stage::CoreClaims => 3,
            Stage::CoreBeneficiary => 4,
        }
    }

    /// Stages 3 and 4 only run for incremental loads
    pub fn applies_to(&self, load_type: LoadType) -> bool {
        match self {
            Stage::Denylist | Stage::Entities => true,
            Stage::CoreClaims | Stage::CoreBeneficiary => load_type == LoadType::Incremental,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Denylist => "denylist",
            Stage::Entities => "entities",
            Stage::CoreClaims => "core-claims",
            Stage::CoreBeneficiary => "core-beneficiary",
        };
        write!(f, "stage {} ({name})", self.number())
    }
}

/// One entity partition to extract and load
#[derive(Debug, Clone)]
pub struct Task {
    pub entity: &'static dyn Entity,
    pub partition: Partition,
    pub stage: Stage,
}

impl Task {
    pub fn table(&self) -> &'static str {
        self.entity.table()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity.table(), self.partition.name)
    }
}

/// Inputs that shape partition expansion and ordering
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub load_type: LoadType,
    /// First date of dated partitions for initial loads
    pub start_date: NaiveDate,
    /// Last date a dated partition may start on
    pub today: NaiveDate,
    /// Replaces the interval of every dated partition group
    pub interval_override: Option<DateInterval>,
    pub seed: u64,
}

/// Builds the task list of each stage
#[derive(Debug)]
pub struct StagePlanner<'a> {
    registry: &'a EntityRegistry,
    settings: PlanSettings,
}

impl<'a> StagePlanner<'a> {
    pub fn new(registry: &'a EntityRegistry, settings: PlanSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &PlanSettings {
        &self.settings
    }

    /// Entities scheduled in a stage, in registry order
    pub fn entities_for(&self, stage: Stage) -> Vec<&'static dyn Entity> {
        if !stage.applies_to(self.settings.load_type) {
            return Vec::new();
        }
        match stage {
            Stage::Denylist => self.registry.with_role(EntityRole::Denylist),
            Stage::Entities => match self.settings.load_type {
                LoadType::Initial => self
                    .registry
                    .entities()
                    .iter()
                    .copied()
                    .filter(|e| e.role() != EntityRole::Denylist)
                    .collect(),
                LoadType::Incremental => self.registry.with_role(EntityRole::Auxiliary),
            },
            Stage::CoreClaims => self.registry.with_role(EntityRole::CoreClaim),
            Stage::CoreBeneficiary => self.registry.with_role(EntityRole::CoreBeneficiary),
        }
    }

    /// Ordered tasks of a stage
    pub fn plan(&self, stage: Stage) -> Vec<Task> {
        // Denylist and beneficiary refreshes are always a single unbounded pass
        let load_type = match stage {
            Stage::Denylist | Stage::CoreBeneficiary => LoadType::Incremental,
            Stage::Entities | Stage::CoreClaims => self.settings.load_type,
        };

        let mut tasks: Vec<Task> = self
            .entities_for(stage)
            .into_iter()
            .flat_map(|entity| {
                self.partitions(entity, load_type)
                    .into_iter()
                    .map(move |partition| Task {
                        entity,
                        partition,
                        stage,
                    })
            })
            .collect();

        let seed = self.settings.seed.wrapping_add(u64::from(stage.number()));
        let mut rng = StdRng::seed_from_u64(seed);
        tasks.shuffle(&mut rng);
        tasks.sort_by_key(|t| t.partition.priority);
        tasks
    }

    /// Partitions of one entity for the given load type
    pub fn partitions(&self, entity: &dyn Entity, load_type: LoadType) -> Vec<Partition> {
        if !entity.is_partitioned() {
            return vec![Partition::for_table(entity.table())];
        }
        entity
            .partition_groups()
            .iter()
            .flat_map(|group| {
                group
                    .with_interval_override(self.settings.interval_override)
                    .generate_ranges(load_type, self.settings.start_date, self.settings.today)
            })
            .collect()
    }
}
