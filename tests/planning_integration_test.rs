//! Integration tests for stage planning through the coordinator

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use idr_pipeline::core::orchestrate::{Stage, Task};
use idr_pipeline::core::partition::{DateInterval, LoadType};
use idr_pipeline::entities::default_registry;
use idr_pipeline::model::{Entity, EntityRole};
use std::collections::HashMap;

fn job_start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 15, 6, 0, 0).unwrap()
}

fn visit_tasks(tasks: &[Task]) -> Vec<&Task> {
    let mut visits: Vec<_> = tasks.iter().filter(|t| t.table() == VISIT_TABLE).collect();
    visits.sort_by_key(|t| t.partition.start_date);
    visits
}

#[test]
fn test_interval_override_reshapes_dated_partitions() {
    let harness = Harness::new();
    let mut settings = settings();
    settings.interval_override = Some(DateInterval::Months(6));
    let coordinator = harness.coordinator(clinic_registry(), settings);

    let tasks = coordinator
        .planner(LoadType::Initial, job_start(), 3)
        .plan(Stage::Entities);
    let visits = visit_tasks(&tasks);

    // 2024H1, 2024H2, 2025H1, 2025H2
    assert_eq!(visits.len(), 4);
    assert_eq!(visits[0].partition.start_date, Some(date(2024, 1, 1)));
    assert_eq!(visits[0].partition.end_date, Some(date(2024, 6, 30)));
    assert_eq!(visits[0].partition.name, "visits-2024-01-01-2024-06-30");
    for pair in visits.windows(2) {
        let end = pair[0].partition.end_date.unwrap();
        assert_eq!(end.succ_opt(), pair[1].partition.start_date);
    }
    assert!(visits
        .iter()
        .all(|t| t.partition.start_date.unwrap() <= job_start().date_naive()));
}

#[test]
fn test_incremental_stages_partition_the_registry() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(clinic_registry(), settings());
    let planner = coordinator.planner(LoadType::Incremental, job_start(), 9);

    let stages: HashMap<Stage, Vec<&'static str>> = Stage::ALL
        .iter()
        .map(|stage| {
            let tables = planner.plan(*stage).iter().map(|t| t.table()).collect();
            (*stage, tables)
        })
        .collect();

    assert_eq!(stages[&Stage::Denylist], vec![DENIED_TABLE]);
    assert_eq!(stages[&Stage::Entities], vec![PROVIDER_TABLE]);
    assert_eq!(stages[&Stage::CoreClaims], vec![VISIT_TABLE]);
    assert_eq!(stages[&Stage::CoreBeneficiary], vec![MEMBER_TABLE]);

    // incremental claims use one unbounded partition per group
    let claims = planner.plan(Stage::CoreClaims);
    assert_eq!(claims[0].partition.name, "visits");
    assert!(!claims[0].partition.is_bounded());
}

#[test]
fn test_default_registry_schedules_every_entity_once_per_incremental_run() {
    let registry = default_registry().unwrap();
    let entities: Vec<_> = registry.entities().to_vec();
    let harness = Harness::new();
    let coordinator = harness.coordinator(registry, settings());
    let planner = coordinator.planner(LoadType::Incremental, job_start(), 21);

    let mut stage_of: HashMap<&'static str, Stage> = HashMap::new();
    for stage in Stage::ALL {
        for task in planner.plan(stage) {
            let previous = stage_of.insert(task.table(), stage);
            assert!(previous.is_none() || previous == Some(stage));
        }
    }

    assert_eq!(stage_of.len(), entities.len());
    for entity in entities {
        let expected = match entity.role() {
            EntityRole::Denylist => Stage::Denylist,
            EntityRole::Auxiliary => Stage::Entities,
            EntityRole::CoreClaim => Stage::CoreClaims,
            EntityRole::CoreBeneficiary => Stage::CoreBeneficiary,
        };
        assert_eq!(stage_of[entity.table()], expected, "{}", entity.table());
    }
}

#[test]
fn test_same_seed_plans_the_same_order() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(default_registry().unwrap(), settings());
    let order = |seed| {
        coordinator
            .planner(LoadType::Initial, job_start(), seed)
            .plan(Stage::Entities)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
    };

    let first = order(1234);
    assert_eq!(first, order(1234));
    assert!(!first.is_empty());
}
