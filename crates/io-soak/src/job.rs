//! Soak jobs.
//!
//! A job owns one volume and one workload instance. Three variants share the
//! [`SoakJob`] capability set:
//!
//! - [`FilesystemSoakJob`] - fio against a mounted filesystem volume
//! - [`RawBlockSoakJob`] - fio against a raw block device
//! - [`DisruptorJob`] - raw block fio that faults after a delay and is
//!   restarted by the platform
//!
//! Each job signals exactly once per [`SoakJob::run`]: its name on the done
//! channel, or a [`JobError`] on the error channel.

use crate::duty_cycle::DutyCycleTable;
use crate::errors::{JobError, PlatformError};
use crate::fio;
use crate::platform::{
    RestartPolicy, SoakIo, VolumeMode, VolumeSpec, WorkloadInstance, WorkloadPlatform,
    WorkloadSpec,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Seconds a disruptor keeps running fio after its fault delay, so the
/// restarted instance also has work to do.
pub const DISRUPTOR_EXTRA_RUNTIME_SECONDS: u64 = 100;

/// Settings shared by every job in a population.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// fio container image.
    pub image: String,
    pub volume_size_mb: u64,
    pub fio_size_mb: u64,
    pub duty_cycles: DutyCycleTable,
}

/// Job variant tag, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Filesystem,
    RawBlock,
    Disruptor,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Filesystem => f.write_str("filesystem"),
            JobKind::RawBlock => f.write_str("raw-block"),
            JobKind::Disruptor => f.write_str("disruptor"),
        }
    }
}

/// Stable identity of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentity {
    /// Ordinal id, used for duty-cycle selection.
    pub id: usize,
    /// Workload instance name; also the job's name in logs and signals.
    pub name: String,
    pub volume_name: String,
    pub storage_class: String,
    pub namespace: String,
}

impl JobIdentity {
    fn new(kind: JobKind, storage_class: &str, namespace: &str, id: usize) -> Self {
        let prefix = match kind {
            JobKind::Filesystem => "fio-filesystem",
            JobKind::RawBlock => "fio-rawblock",
            JobKind::Disruptor => "fio-disruptor",
        };
        let name = format!("{prefix}-{storage_class}-{id}");
        Self {
            id,
            volume_name: name.clone(),
            name,
            storage_class: storage_class.to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn instance(&self) -> WorkloadInstance {
        WorkloadInstance {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Capability set of a soak job.
#[async_trait::async_trait]
pub trait SoakJob: Send + Sync {
    fn identity(&self) -> &JobIdentity;

    fn kind(&self) -> JobKind;

    fn volume_mode(&self) -> VolumeMode;

    /// Namespace this job requires to be created for it, if any.
    fn isolated_namespace(&self) -> Option<&str> {
        None
    }

    /// Workload instance name.
    fn name(&self) -> &str {
        &self.identity().name
    }

    async fn make_volume(&self) -> Result<(), PlatformError>;

    async fn remove_volume(&self) -> Result<(), PlatformError>;

    async fn make_workload_instance(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<WorkloadInstance, PlatformError>;

    async fn remove_workload_instance(&self) -> Result<(), PlatformError>;

    /// Run soak I/O for `duration` and signal the outcome exactly once.
    async fn run(
        &self,
        duration: Duration,
        done: mpsc::Sender<String>,
        errors: mpsc::Sender<JobError>,
    );
}

/// State and platform plumbing shared by every variant.
struct JobCore {
    identity: JobIdentity,
    platform: Arc<dyn WorkloadPlatform>,
    settings: Arc<JobSettings>,
}

impl JobCore {
    async fn make_volume(&self, mode: VolumeMode) -> Result<(), PlatformError> {
        let spec = VolumeSpec {
            name: self.identity.volume_name.clone(),
            namespace: self.identity.namespace.clone(),
            storage_class: self.identity.storage_class.clone(),
            size_mb: self.settings.volume_size_mb,
            mode,
        };
        debug!(target: "soak.job", job = %self.identity.name, mode = mode.as_str(), "Creating volume");
        self.platform.create_volume(&spec).await
    }

    async fn remove_volume(&self) -> Result<(), PlatformError> {
        self.platform
            .delete_volume(&self.identity.volume_name, &self.identity.namespace)
            .await
    }

    async fn remove_workload_instance(&self) -> Result<(), PlatformError> {
        self.platform
            .delete_workload(&self.identity.name, &self.identity.namespace)
            .await
    }

    fn workload_spec(
        &self,
        mode: VolumeMode,
        args: Vec<String>,
        selector: &BTreeMap<String, String>,
        restart_policy: RestartPolicy,
    ) -> WorkloadSpec {
        WorkloadSpec {
            name: self.identity.name.clone(),
            namespace: self.identity.namespace.clone(),
            volume_name: self.identity.volume_name.clone(),
            volume_mode: mode,
            image: self.settings.image.clone(),
            args,
            node_selector: selector.clone(),
            restart_policy,
        }
    }

    /// fio arguments for the workload's own entrypoint, after the `--` separator.
    fn entrypoint_fio_args(&self, runtime_secs: u64, mode: VolumeMode) -> Vec<String> {
        let mut args = vec!["--".to_string()];
        args.extend(fio::run_args(
            runtime_secs,
            mode,
            self.settings.duty_cycles.select(self.identity.id),
            self.settings.fio_size_mb,
        ));
        args
    }

    /// Shared soak I/O routine; sends exactly one signal.
    async fn run(
        &self,
        duration: Duration,
        mode: VolumeMode,
        done: mpsc::Sender<String>,
        errors: mpsc::Sender<JobError>,
    ) {
        let duty_cycle = self.settings.duty_cycles.select(self.identity.id);
        let io = SoakIo {
            duration,
            think_time: duty_cycle.think_time,
            think_time_blocks: duty_cycle.think_time_blocks,
            volume_mode: mode,
        };

        info!(
            target: "soak.job",
            job = %self.identity.name,
            duration_secs = duration.as_secs(),
            think_time = io.think_time,
            think_time_blocks = io.think_time_blocks,
            "Running soak I/O"
        );

        let sent = match self.platform.run_soak_io(&self.identity.instance(), io).await {
            Ok(()) => done.send(self.identity.name.clone()).await.is_ok(),
            Err(e) => errors
                .send(JobError::new(self.identity.name.clone(), e.to_string()))
                .await
                .is_ok(),
        };

        if !sent {
            warn!(
                target: "soak.job",
                job = %self.identity.name,
                "Result receiver dropped before run signal was delivered"
            );
        }
    }
}

/// fio soak against a filesystem volume.
pub struct FilesystemSoakJob {
    core: JobCore,
    duration: Duration,
}

impl FilesystemSoakJob {
    pub fn new(
        storage_class: &str,
        namespace: &str,
        id: usize,
        duration: Duration,
        platform: Arc<dyn WorkloadPlatform>,
        settings: Arc<JobSettings>,
    ) -> Self {
        Self {
            core: JobCore {
                identity: JobIdentity::new(JobKind::Filesystem, storage_class, namespace, id),
                platform,
                settings,
            },
            duration,
        }
    }
}

#[async_trait::async_trait]
impl SoakJob for FilesystemSoakJob {
    fn identity(&self) -> &JobIdentity {
        &self.core.identity
    }

    fn kind(&self) -> JobKind {
        JobKind::Filesystem
    }

    fn volume_mode(&self) -> VolumeMode {
        VolumeMode::Filesystem
    }

    async fn make_volume(&self) -> Result<(), PlatformError> {
        self.core.make_volume(VolumeMode::Filesystem).await
    }

    async fn remove_volume(&self) -> Result<(), PlatformError> {
        self.core.remove_volume().await
    }

    async fn make_workload_instance(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<WorkloadInstance, PlatformError> {
        let args = self
            .core
            .entrypoint_fio_args(self.duration.as_secs(), VolumeMode::Filesystem);
        let spec = self
            .core
            .workload_spec(VolumeMode::Filesystem, args, selector, RestartPolicy::Never);
        self.core.platform.create_workload(&spec).await
    }

    async fn remove_workload_instance(&self) -> Result<(), PlatformError> {
        self.core.remove_workload_instance().await
    }

    async fn run(
        &self,
        duration: Duration,
        done: mpsc::Sender<String>,
        errors: mpsc::Sender<JobError>,
    ) {
        self.core
            .run(duration, VolumeMode::Filesystem, done, errors)
            .await;
    }
}

/// fio soak against a raw block device.
pub struct RawBlockSoakJob {
    core: JobCore,
    duration: Duration,
}

impl RawBlockSoakJob {
    pub fn new(
        storage_class: &str,
        namespace: &str,
        id: usize,
        duration: Duration,
        platform: Arc<dyn WorkloadPlatform>,
        settings: Arc<JobSettings>,
    ) -> Self {
        Self {
            core: JobCore {
                identity: JobIdentity::new(JobKind::RawBlock, storage_class, namespace, id),
                platform,
                settings,
            },
            duration,
        }
    }
}

#[async_trait::async_trait]
impl SoakJob for RawBlockSoakJob {
    fn identity(&self) -> &JobIdentity {
        &self.core.identity
    }

    fn kind(&self) -> JobKind {
        JobKind::RawBlock
    }

    fn volume_mode(&self) -> VolumeMode {
        VolumeMode::RawBlock
    }

    async fn make_volume(&self) -> Result<(), PlatformError> {
        self.core.make_volume(VolumeMode::RawBlock).await
    }

    async fn remove_volume(&self) -> Result<(), PlatformError> {
        self.core.remove_volume().await
    }

    async fn make_workload_instance(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<WorkloadInstance, PlatformError> {
        let args = self
            .core
            .entrypoint_fio_args(self.duration.as_secs(), VolumeMode::RawBlock);
        let spec = self
            .core
            .workload_spec(VolumeMode::RawBlock, args, selector, RestartPolicy::Never);
        self.core.platform.create_workload(&spec).await
    }

    async fn remove_workload_instance(&self) -> Result<(), PlatformError> {
        self.core.remove_workload_instance().await
    }

    async fn run(
        &self,
        duration: Duration,
        done: mpsc::Sender<String>,
        errors: mpsc::Sender<JobError>,
    ) {
        self.core
            .run(duration, VolumeMode::RawBlock, done, errors)
            .await;
    }
}

/// Raw block fio that is killed after `fault_delay` and restarted.
///
/// The fault is expected behavior: the instance restarts automatically and
/// fio keeps running for `fault_delay + 100` seconds.
pub struct DisruptorJob {
    core: JobCore,
    fault_delay: Duration,
}

impl DisruptorJob {
    pub fn new(
        storage_class: &str,
        namespace: &str,
        id: usize,
        fault_delay: Duration,
        platform: Arc<dyn WorkloadPlatform>,
        settings: Arc<JobSettings>,
    ) -> Self {
        Self {
            core: JobCore {
                identity: JobIdentity::new(JobKind::Disruptor, storage_class, namespace, id),
                platform,
                settings,
            },
            fault_delay,
        }
    }

    pub fn fault_delay(&self) -> Duration {
        self.fault_delay
    }
}

#[async_trait::async_trait]
impl SoakJob for DisruptorJob {
    fn identity(&self) -> &JobIdentity {
        &self.core.identity
    }

    fn kind(&self) -> JobKind {
        JobKind::Disruptor
    }

    fn volume_mode(&self) -> VolumeMode {
        VolumeMode::RawBlock
    }

    fn isolated_namespace(&self) -> Option<&str> {
        Some(self.core.identity.namespace.as_str())
    }

    async fn make_volume(&self) -> Result<(), PlatformError> {
        self.core.make_volume(VolumeMode::RawBlock).await
    }

    async fn remove_volume(&self) -> Result<(), PlatformError> {
        self.core.remove_volume().await
    }

    async fn make_workload_instance(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<WorkloadInstance, PlatformError> {
        let delay = self.fault_delay.as_secs();
        let mut args = vec!["segfault-after".to_string(), delay.to_string()];
        args.extend(self.core.entrypoint_fio_args(
            delay + DISRUPTOR_EXTRA_RUNTIME_SECONDS,
            VolumeMode::RawBlock,
        ));
        let spec =
            self.core
                .workload_spec(VolumeMode::RawBlock, args, selector, RestartPolicy::Always);
        self.core.platform.create_workload(&spec).await
    }

    async fn remove_workload_instance(&self) -> Result<(), PlatformError> {
        self.core.remove_workload_instance().await
    }

    async fn run(
        &self,
        duration: Duration,
        done: mpsc::Sender<String>,
        errors: mpsc::Sender<JobError>,
    ) {
        self.core
            .run(duration, VolumeMode::RawBlock, done, errors)
            .await;
    }
}
