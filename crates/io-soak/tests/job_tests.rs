//! Job capability tests: resource calls and the single run signal.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use io_soak::errors::JobError;
use io_soak::job::SoakJob;
use io_soak::platform::{VolumeMode, WorkloadPlatform};
use soak_test_utils::*;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

const DURATION: Duration = Duration::from_secs(30);

async fn prepare(mock: &MockPlatform) {
    for class in test_storage_classes() {
        mock.create_storage_class(&class).await.unwrap();
    }
    mock.create_namespace("disrupt").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_successful_run_signals_done_once() {
    let mock = MockPlatform::new();
    prepare(&mock).await;
    let job = fs_job(&mock, 1, DURATION);
    job.make_volume().await.unwrap();
    let instance = job
        .make_workload_instance(&test_orchestrator_settings().node_selector)
        .await
        .unwrap();
    assert_eq!(instance.name, job.name());
    assert_eq!(instance.namespace, "default");

    let (done_tx, mut done_rx) = mpsc::channel(1);
    let (err_tx, mut err_rx) = mpsc::channel::<JobError>(1);
    job.run(DURATION, done_tx, err_tx).await;

    assert_eq!(done_rx.recv().await.as_deref(), Some(job.name()));
    assert_eq!(done_rx.try_recv(), Err(TryRecvError::Disconnected));
    assert_eq!(err_rx.try_recv(), Err(TryRecvError::Disconnected));

    let io = mock.soak_io(job.name()).unwrap();
    assert_eq!(io.volume_mode, VolumeMode::Filesystem);
    assert_eq!(io.duration, DURATION);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_signals_error_once() {
    let mock = MockPlatform::new().with_failure(MockOp::RunSoakIo, "fio-rawblock-io-soak-nvmf-2");
    prepare(&mock).await;
    let job = block_job(&mock, 2, DURATION);

    let (done_tx, mut done_rx) = mpsc::channel::<String>(1);
    let (err_tx, mut err_rx) = mpsc::channel(1);
    job.run(DURATION, done_tx, err_tx).await;

    let err = err_rx.recv().await.unwrap();
    assert_eq!(err.job, job.name());
    assert!(err.cause.contains("injected"));
    assert!(err.to_string().starts_with("job fio-rawblock-io-soak-nvmf-2 failed"));
    assert_eq!(err_rx.try_recv(), Err(TryRecvError::Disconnected));
    assert_eq!(done_rx.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn test_run_survives_dropped_receiver() {
    let mock = MockPlatform::new();
    let job = fs_job(&mock, 1, DURATION);

    let (done_tx, done_rx) = mpsc::channel::<String>(1);
    let (err_tx, err_rx) = mpsc::channel::<JobError>(1);
    drop((done_rx, err_rx));

    // Must return rather than panic or hang.
    job.run(DURATION, done_tx, err_tx).await;
}

#[tokio::test]
async fn test_volume_modes_follow_job_kind() {
    let mock = MockPlatform::new();
    assert_eq!(fs_job(&mock, 1, DURATION).volume_mode(), VolumeMode::Filesystem);
    assert_eq!(block_job(&mock, 2, DURATION).volume_mode(), VolumeMode::RawBlock);

    let disruptor = disruptor_job(&mock, 3, Duration::from_secs(10));
    assert_eq!(disruptor.volume_mode(), VolumeMode::RawBlock);
    assert_eq!(disruptor.isolated_namespace(), Some("disrupt"));
    assert_eq!(fs_job(&mock, 1, DURATION).isolated_namespace(), None);
}

#[tokio::test]
async fn test_remove_calls_target_job_resources() {
    let mock = MockPlatform::new();
    prepare(&mock).await;
    let job = disruptor_job(&mock, 3, Duration::from_secs(10));

    job.make_volume().await.unwrap();
    job.make_workload_instance(&test_orchestrator_settings().node_selector)
        .await
        .unwrap();
    assert!(mock.has_workload(job.name()));

    job.remove_workload_instance().await.unwrap();
    job.remove_volume().await.unwrap();

    assert!(!mock.has_workload(job.name()));
    assert!(!mock.has_volume(&job.identity().volume_name));
    assert_eq!(
        mock.calls().last(),
        Some(&PlatformCall::DeleteVolume(job.identity().volume_name.clone()))
    );
}
