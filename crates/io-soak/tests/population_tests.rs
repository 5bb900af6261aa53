//! Population construction from configuration.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]

use std::collections::HashMap;
use std::time::Duration;

use io_soak::config::Config;
use io_soak::errors::SoakError;
use io_soak::job::{JobKind, SoakJob};
use io_soak::platform::VolumeMode;
use io_soak::population::Population;
use soak_test_utils::{disruptor_job, fs_job, platform_of, test_storage_classes, MockPlatform};

fn config(pairs: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_vars(&vars).expect("Config should load successfully")
}

#[test]
fn test_default_population() {
    let population = Population::from_config(&config(&[]), platform_of(&MockPlatform::new()));

    assert_eq!(population.len(), 2);
    assert_eq!(population.storage_classes.len(), 1);
    assert_eq!(population.storage_classes[0].name, "io-soak-nvmf");
    assert!(population.isolated_namespaces().is_empty());

    let names: Vec<_> = population.jobs.iter().map(|j| j.name().to_string()).collect();
    assert_eq!(
        names,
        vec!["fio-filesystem-io-soak-nvmf-1", "fio-rawblock-io-soak-nvmf-2"]
    );
}

#[test]
fn test_jobs_alternate_kinds_and_spread_over_protocols() {
    let population = Population::from_config(
        &config(&[
            ("SOAK_PROTOCOLS", "nvmf,iscsi"),
            ("SOAK_STORAGE_NODES", "2"),
            ("SOAK_LOAD_FACTOR", "2"),
        ]),
        platform_of(&MockPlatform::new()),
    );

    assert_eq!(population.len(), 4);
    let summary: Vec<_> = population
        .jobs
        .iter()
        .map(|j| (j.identity().id, j.kind(), j.identity().storage_class.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, JobKind::Filesystem, "io-soak-nvmf".to_string()),
            (2, JobKind::RawBlock, "io-soak-iscsi".to_string()),
            (3, JobKind::Filesystem, "io-soak-nvmf".to_string()),
            (4, JobKind::RawBlock, "io-soak-iscsi".to_string()),
        ]
    );
    assert!(population
        .jobs
        .iter()
        .all(|j| j.identity().namespace == "default"));
}

#[test]
fn test_disruptors_are_numbered_from_one_in_their_own_namespace() {
    let population = Population::from_config(
        &config(&[
            ("SOAK_PROTOCOLS", "nvmf,iscsi"),
            ("SOAK_DISRUPTOR_COUNT", "3"),
            ("SOAK_FAULT_AFTER_SECONDS", "10"),
        ]),
        platform_of(&MockPlatform::new()),
    );

    assert_eq!(population.len(), 5);
    assert_eq!(population.storage_classes.len(), 4);

    let disruptors: Vec<_> = population
        .jobs
        .iter()
        .filter(|j| j.kind() == JobKind::Disruptor)
        .collect();
    assert_eq!(disruptors.len(), 3);
    assert_eq!(
        disruptors.iter().map(|j| j.name()).collect::<Vec<_>>(),
        vec![
            "fio-disruptor-iosoak-disruptor-nvmf-1",
            "fio-disruptor-iosoak-disruptor-iscsi-2",
            "fio-disruptor-iosoak-disruptor-nvmf-3",
        ]
    );
    assert_eq!(
        disruptors.iter().map(|j| j.identity().id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(disruptors.iter().all(|j| j.identity().namespace == "disrupt"));
    assert!(disruptors.iter().all(|j| j.volume_mode() == VolumeMode::RawBlock));
    assert_eq!(population.isolated_namespaces(), vec!["disrupt".to_string()]);
}

#[test]
fn test_unreferenced_storage_classes_are_filtered() {
    let population = Population::from_config(
        &config(&[
            ("SOAK_PROTOCOLS", "nvmf,iscsi"),
            ("SOAK_STORAGE_NODES", "1"),
            ("SOAK_LOAD_FACTOR", "1"),
        ]),
        platform_of(&MockPlatform::new()),
    );

    let referenced: Vec<_> = population
        .referenced_storage_classes()
        .into_iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(population.storage_classes.len(), 2);
    assert_eq!(referenced, vec!["io-soak-nvmf".to_string()]);
}

#[test]
fn test_empty_population() {
    let population = Population::from_config(
        &config(&[("SOAK_LOAD_FACTOR", "0")]),
        platform_of(&MockPlatform::new()),
    );
    assert!(population.is_empty());
    assert!(population.referenced_storage_classes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_population_runs_and_passes() {
    use io_soak::orchestrator::Orchestrator;
    use soak_test_utils::test_orchestrator_settings;

    let mock = MockPlatform::new();
    let population = Population::from_config(&config(&[("SOAK_LOAD_FACTOR", "0")]), platform_of(&mock));
    let mut orch = Orchestrator::new(platform_of(&mock), population, test_orchestrator_settings());

    orch.setup().await.unwrap();
    let outcome = orch.run_soak(Duration::from_secs(60)).await.unwrap();
    assert!(outcome.passed);
    orch.teardown().await.unwrap();
    assert!(mock.calls().is_empty());
}

#[test]
fn test_duplicate_job_names_are_rejected() {
    let mock = MockPlatform::new();
    let duration = Duration::from_secs(60);
    let result = Population::new(
        test_storage_classes(),
        vec![fs_job(&mock, 1, duration), fs_job(&mock, 2, duration), fs_job(&mock, 1, duration)],
    );

    match result {
        Err(SoakError::DuplicateJob { name }) => {
            assert_eq!(name, "fio-filesystem-io-soak-nvmf-1");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("duplicate job names were accepted"),
    }
}

#[test]
fn test_disruptor_and_soak_ids_may_overlap() {
    let mock = MockPlatform::new();
    let duration = Duration::from_secs(60);
    let population = Population::new(
        test_storage_classes(),
        vec![fs_job(&mock, 1, duration), disruptor_job(&mock, 1, Duration::from_secs(10))],
    )
    .unwrap();
    assert_eq!(population.len(), 2);
}

#[test]
fn test_configured_population_has_unique_names() {
    let population = Population::from_config(
        &config(&[
            ("SOAK_PROTOCOLS", "nvmf,iscsi"),
            ("SOAK_STORAGE_NODES", "3"),
            ("SOAK_LOAD_FACTOR", "2"),
            ("SOAK_DISRUPTOR_COUNT", "4"),
            ("SOAK_FAULT_AFTER_SECONDS", "10"),
        ]),
        platform_of(&MockPlatform::new()),
    );

    let names: Vec<_> = population.jobs.iter().map(|j| j.name().to_string()).collect();
    let rebuilt = Population::new(population.storage_classes.clone(), population.jobs.clone());
    assert_eq!(names.len(), 10);
    assert!(rebuilt.is_ok(), "names collide: {names:?}");
}
