//! Workload platform abstraction.
//!
//! The orchestrator never talks to a cluster directly. Every resource
//! lifecycle operation goes through [`WorkloadPlatform`], which lets the
//! population logic be exercised against an in-memory mock.
//!
//! # Implementations
//!
//! - [`KubectlPlatform`] - drives a Kubernetes cluster through `kubectl`

pub mod kubectl;
pub mod manifest;

pub use kubectl::KubectlPlatform;

use crate::errors::PlatformError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Volume share protocol used by a storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShareProtocol {
    Nvmf,
    Iscsi,
}

impl ShareProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareProtocol::Nvmf => "nvmf",
            ShareProtocol::Iscsi => "iscsi",
        }
    }
}

impl fmt::Display for ShareProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nvmf" => Ok(ShareProtocol::Nvmf),
            "iscsi" => Ok(ShareProtocol::Iscsi),
            other => Err(format!("unknown share protocol '{other}'")),
        }
    }
}

/// Storage class provisioning policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageClassSpec {
    pub name: String,
    pub protocol: ShareProtocol,
    pub replicas: u32,
}

/// How a volume is presented to the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeMode {
    /// Formatted and mounted.
    Filesystem,
    /// Exposed as a raw block device.
    RawBlock,
}

impl VolumeMode {
    /// Name of the mode in the volume claim.
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeMode::Filesystem => "Filesystem",
            VolumeMode::RawBlock => "Block",
        }
    }
}

/// Volume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub namespace: String,
    pub storage_class: String,
    pub size_mb: u64,
    pub mode: VolumeMode,
}

/// Restart behavior of a workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    Never,
    Always,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "Never",
            RestartPolicy::Always => "Always",
        }
    }
}

/// Workload instance definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub volume_name: String,
    pub volume_mode: VolumeMode,
    pub image: String,
    pub args: Vec<String>,
    pub node_selector: BTreeMap<String, String>,
    pub restart_policy: RestartPolicy,
}

/// Handle to a created workload instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadInstance {
    pub name: String,
    pub namespace: String,
}

/// One soak I/O invocation against a running workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoakIo {
    pub duration: Duration,
    pub think_time: u32,
    pub think_time_blocks: u32,
    pub volume_mode: VolumeMode,
}

/// Resource lifecycle operations consumed by the orchestrator.
#[async_trait::async_trait]
pub trait WorkloadPlatform: Send + Sync {
    async fn create_storage_class(&self, spec: &StorageClassSpec) -> Result<(), PlatformError>;

    async fn delete_storage_class(&self, name: &str) -> Result<(), PlatformError>;

    async fn create_namespace(&self, name: &str) -> Result<(), PlatformError>;

    async fn delete_namespace(&self, name: &str) -> Result<(), PlatformError>;

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<(), PlatformError>;

    async fn delete_volume(&self, name: &str, namespace: &str) -> Result<(), PlatformError>;

    async fn create_workload(&self, spec: &WorkloadSpec)
        -> Result<WorkloadInstance, PlatformError>;

    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<(), PlatformError>;

    /// Whether the named workload instance is currently running.
    async fn is_running(&self, name: &str, namespace: &str) -> Result<bool, PlatformError>;

    /// Run the soak I/O load inside a workload instance until `io.duration` elapses.
    async fn run_soak_io(
        &self,
        instance: &WorkloadInstance,
        io: SoakIo,
    ) -> Result<(), PlatformError>;
}
