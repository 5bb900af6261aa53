//! Job and population fixtures.

use crate::mock_platform::MockPlatform;
use io_soak::duty_cycle::DutyCycleTable;
use io_soak::job::{DisruptorJob, FilesystemSoakJob, JobSettings, RawBlockSoakJob, SoakJob};
use io_soak::orchestrator::OrchestratorSettings;
use io_soak::platform::{ShareProtocol, StorageClassSpec, WorkloadPlatform};
use io_soak::population::{disruptor_storage_class_name, soak_storage_class_name, Population};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Soak storage class used by the fixtures.
pub fn soak_class() -> String {
    soak_storage_class_name("nvmf")
}

/// Disruptor storage class used by the fixtures.
pub fn disruptor_class() -> String {
    disruptor_storage_class_name("nvmf")
}

/// Job settings with an empty duty-cycle table.
pub fn test_settings() -> Arc<JobSettings> {
    test_settings_with_cycles(DutyCycleTable::default())
}

pub fn test_settings_with_cycles(duty_cycles: DutyCycleTable) -> Arc<JobSettings> {
    Arc::new(JobSettings {
        image: "registry.test/mayastor/e2e-fio".to_string(),
        volume_size_mb: 500,
        fio_size_mb: 400,
        duty_cycles,
    })
}

/// Orchestrator settings with a 20s readiness allowance and 60s signal grace.
pub fn test_orchestrator_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        node_selector: BTreeMap::from([("e2e-app".to_string(), "true".to_string())]),
        pod_ready_allowance: Duration::from_secs(20),
        signal_grace: Duration::from_secs(60),
    }
}

pub fn platform_of(mock: &MockPlatform) -> Arc<dyn WorkloadPlatform> {
    Arc::new(mock.clone())
}

pub fn fs_job(mock: &MockPlatform, id: usize, duration: Duration) -> Arc<dyn SoakJob> {
    Arc::new(FilesystemSoakJob::new(
        &soak_class(),
        "default",
        id,
        duration,
        platform_of(mock),
        test_settings(),
    ))
}

pub fn block_job(mock: &MockPlatform, id: usize, duration: Duration) -> Arc<dyn SoakJob> {
    Arc::new(RawBlockSoakJob::new(
        &soak_class(),
        "default",
        id,
        duration,
        platform_of(mock),
        test_settings(),
    ))
}

pub fn disruptor_job(mock: &MockPlatform, id: usize, fault_delay: Duration) -> Arc<dyn SoakJob> {
    Arc::new(DisruptorJob::new(
        &disruptor_class(),
        "disrupt",
        id,
        fault_delay,
        platform_of(mock),
        test_settings(),
    ))
}

/// Storage classes for both job families on nvmf with one replica.
pub fn test_storage_classes() -> Vec<StorageClassSpec> {
    vec![
        StorageClassSpec {
            name: soak_class(),
            protocol: ShareProtocol::Nvmf,
            replicas: 1,
        },
        StorageClassSpec {
            name: disruptor_class(),
            protocol: ShareProtocol::Nvmf,
            replicas: 1,
        },
    ]
}

/// `count` filesystem jobs with ids `1..=count`.
pub fn fs_population(mock: &MockPlatform, count: usize, duration: Duration) -> Population {
    let jobs = (1..=count).map(|id| fs_job(mock, id, duration)).collect();
    Population::new(test_storage_classes(), jobs).expect("fixture job names are unique")
}

/// Filesystem job 1, raw block job 2 and disruptor job 3.
pub fn mixed_population(mock: &MockPlatform, duration: Duration, fault_delay: Duration) -> Population {
    Population::new(
        test_storage_classes(),
        vec![
            fs_job(mock, 1, duration),
            block_job(mock, 2, duration),
            disruptor_job(mock, 3, fault_delay),
        ],
    )
    .expect("fixture job names are unique")
}
