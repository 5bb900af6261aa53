//! In-memory workload platform.
//!
//! Tracks live resources and enforces the same dependency rules a cluster
//! would: a volume needs its storage class and namespace, an instance needs
//! its volume, and nothing can be removed while something still uses it.
//! Violations are returned as [`PlatformError::Rejected`].
//!
//! # Example
//!
//! ```rust,ignore
//! use soak_test_utils::{MockOp, MockPlatform};
//!
//! let mock = MockPlatform::new()
//!     .with_failure(MockOp::DeleteVolume, "fio-rawblock-io-soak-nvmf-2")
//!     .with_silent_run("fio-filesystem-io-soak-nvmf-1");
//! ```

use io_soak::errors::PlatformError;
use io_soak::platform::{
    SoakIo, StorageClassSpec, VolumeSpec, WorkloadInstance, WorkloadPlatform, WorkloadSpec,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Platform operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    CreateStorageClass,
    DeleteStorageClass,
    CreateNamespace,
    DeleteNamespace,
    CreateVolume,
    DeleteVolume,
    CreateWorkload,
    DeleteWorkload,
    RunSoakIo,
}

/// A recorded platform call. Readiness polls are counted, not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateStorageClass(String),
    DeleteStorageClass(String),
    CreateNamespace(String),
    DeleteNamespace(String),
    CreateVolume(String),
    DeleteVolume(String),
    CreateWorkload(String),
    DeleteWorkload(String),
    RunSoakIo(String),
}

impl PlatformCall {
    /// Name of the resource the call targeted.
    pub fn resource(&self) -> &str {
        match self {
            PlatformCall::CreateStorageClass(n)
            | PlatformCall::DeleteStorageClass(n)
            | PlatformCall::CreateNamespace(n)
            | PlatformCall::DeleteNamespace(n)
            | PlatformCall::CreateVolume(n)
            | PlatformCall::DeleteVolume(n)
            | PlatformCall::CreateWorkload(n)
            | PlatformCall::DeleteWorkload(n)
            | PlatformCall::RunSoakIo(n) => n,
        }
    }
}

#[derive(Debug, Clone)]
struct LiveVolume {
    namespace: String,
    storage_class: String,
}

#[derive(Debug, Clone)]
struct LiveWorkload {
    namespace: String,
    volume: String,
}

#[derive(Debug, Clone, Copy)]
enum RunBehavior {
    /// Sleep for the requested duration, then succeed.
    Normal,
    /// Never return.
    Silent,
    /// Sleep for the given time, then fail.
    FailAfter(Duration),
}

#[derive(Debug, Default)]
struct MockPlatformInner {
    calls: Vec<PlatformCall>,
    failures: HashSet<(MockOp, String)>,

    storage_classes: HashSet<String>,
    namespaces: HashSet<String>,
    volumes: HashMap<String, LiveVolume>,
    workloads: HashMap<String, LiveWorkload>,
    workload_specs: HashMap<String, WorkloadSpec>,

    /// Scripted `is_running` answers; the last answer repeats.
    running: HashMap<String, VecDeque<bool>>,
    polls: HashMap<String, u32>,
    /// Status queries that never return.
    hung_status: HashSet<String>,

    run_behavior: HashMap<String, RunBehavior>,
    soak_io: HashMap<String, SoakIo>,
}

/// In-memory workload platform for orchestrator tests.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    inner: Arc<Mutex<MockPlatformInner>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// Create a platform with only the `default` namespace.
    ///
    /// Instances report running on the first poll unless scripted otherwise.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = MockPlatformInner::default();
        inner.namespaces.insert("default".to_string());
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Make `op` fail for the resource called `name`.
    #[must_use]
    pub fn with_failure(self, op: MockOp, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert((op, name.to_string()));
        self
    }

    /// Script successive `is_running` answers for `name`.
    #[must_use]
    pub fn with_running_sequence(self, name: &str, answers: impl IntoIterator<Item = bool>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .running
            .insert(name.to_string(), answers.into_iter().collect());
        self
    }

    /// Report `name` as not running for `polls` polls, then running.
    #[must_use]
    pub fn with_running_after(self, name: &str, polls: usize) -> Self {
        let answers = std::iter::repeat(false)
            .take(polls)
            .chain(std::iter::once(true));
        self.with_running_sequence(name, answers)
    }

    /// Never report `name` as running.
    #[must_use]
    pub fn with_never_running(self, name: &str) -> Self {
        self.with_running_sequence(name, [false])
    }

    /// `is_running` for `name` never returns.
    #[must_use]
    pub fn with_hung_status(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .hung_status
            .insert(name.to_string());
        self
    }

    /// Soak I/O for `name` never returns.
    #[must_use]
    pub fn with_silent_run(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .run_behavior
            .insert(name.to_string(), RunBehavior::Silent);
        self
    }

    /// Soak I/O for `name` fails after `after`.
    #[must_use]
    pub fn with_run_failure_after(self, name: &str, after: Duration) -> Self {
        self.inner
            .lock()
            .unwrap()
            .run_behavior
            .insert(name.to_string(), RunBehavior::FailAfter(after));
        self
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Index of the first recorded call equal to `call`.
    pub fn position(&self, call: &PlatformCall) -> Option<usize> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .position(|c| c == call)
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &PlatformCall) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    /// Number of `is_running` queries for `name`.
    pub fn polls(&self, name: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .polls
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Spec the workload `name` was created with.
    pub fn workload_spec(&self, name: &str) -> Option<WorkloadSpec> {
        self.inner.lock().unwrap().workload_specs.get(name).cloned()
    }

    /// Soak I/O parameters `name` was last run with.
    pub fn soak_io(&self, name: &str) -> Option<SoakIo> {
        self.inner.lock().unwrap().soak_io.get(name).copied()
    }

    pub fn has_storage_class(&self, name: &str) -> bool {
        self.inner.lock().unwrap().storage_classes.contains(name)
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.inner.lock().unwrap().namespaces.contains(name)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.inner.lock().unwrap().volumes.contains_key(name)
    }

    pub fn has_workload(&self, name: &str) -> bool {
        self.inner.lock().unwrap().workloads.contains_key(name)
    }

    /// Live storage classes, volumes and workloads.
    ///
    /// Namespaces are excluded because `default` always exists.
    pub fn live_resource_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.storage_classes.len() + inner.volumes.len() + inner.workloads.len()
    }

    /// Record `call` and fail if `op` was injected for its resource.
    fn enter(inner: &mut MockPlatformInner, op: MockOp, call: PlatformCall) -> Result<(), PlatformError> {
        let name = call.resource().to_string();
        inner.calls.push(call);
        if inner.failures.contains(&(op, name.clone())) {
            return Err(PlatformError::Rejected(format!("injected {op:?} failure for {name}")));
        }
        Ok(())
    }
}

fn rejected(msg: impl Into<String>) -> PlatformError {
    PlatformError::Rejected(msg.into())
}

#[async_trait::async_trait]
impl WorkloadPlatform for MockPlatform {
    async fn create_storage_class(&self, spec: &StorageClassSpec) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::CreateStorageClass,
            PlatformCall::CreateStorageClass(spec.name.clone()),
        )?;
        inner.storage_classes.insert(spec.name.clone());
        Ok(())
    }

    async fn delete_storage_class(&self, name: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::DeleteStorageClass,
            PlatformCall::DeleteStorageClass(name.to_string()),
        )?;
        if inner.volumes.values().any(|v| v.storage_class == name) {
            return Err(rejected(format!("storage class {name} still has volumes")));
        }
        if !inner.storage_classes.remove(name) {
            return Err(rejected(format!("storage class {name} not found")));
        }
        Ok(())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::CreateNamespace,
            PlatformCall::CreateNamespace(name.to_string()),
        )?;
        inner.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::DeleteNamespace,
            PlatformCall::DeleteNamespace(name.to_string()),
        )?;
        if inner.volumes.values().any(|v| v.namespace == name)
            || inner.workloads.values().any(|w| w.namespace == name)
        {
            return Err(rejected(format!("namespace {name} is not empty")));
        }
        if !inner.namespaces.remove(name) {
            return Err(rejected(format!("namespace {name} not found")));
        }
        Ok(())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::CreateVolume,
            PlatformCall::CreateVolume(spec.name.clone()),
        )?;
        if !inner.storage_classes.contains(&spec.storage_class) {
            return Err(rejected(format!("storage class {} not found", spec.storage_class)));
        }
        if !inner.namespaces.contains(&spec.namespace) {
            return Err(rejected(format!("namespace {} not found", spec.namespace)));
        }
        inner.volumes.insert(
            spec.name.clone(),
            LiveVolume {
                namespace: spec.namespace.clone(),
                storage_class: spec.storage_class.clone(),
            },
        );
        Ok(())
    }

    async fn delete_volume(&self, name: &str, _namespace: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::DeleteVolume,
            PlatformCall::DeleteVolume(name.to_string()),
        )?;
        if inner.workloads.values().any(|w| w.volume == name) {
            return Err(rejected(format!("volume {name} is in use")));
        }
        if inner.volumes.remove(name).is_none() {
            return Err(rejected(format!("volume {name} not found")));
        }
        Ok(())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadInstance, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::CreateWorkload,
            PlatformCall::CreateWorkload(spec.name.clone()),
        )?;
        if !inner.volumes.contains_key(&spec.volume_name) {
            return Err(rejected(format!("volume {} not found", spec.volume_name)));
        }
        inner.workloads.insert(
            spec.name.clone(),
            LiveWorkload {
                namespace: spec.namespace.clone(),
                volume: spec.volume_name.clone(),
            },
        );
        inner.workload_specs.insert(spec.name.clone(), spec.clone());
        Ok(WorkloadInstance {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
        })
    }

    async fn delete_workload(&self, name: &str, _namespace: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        Self::enter(
            &mut inner,
            MockOp::DeleteWorkload,
            PlatformCall::DeleteWorkload(name.to_string()),
        )?;
        if inner.workloads.remove(name).is_none() {
            return Err(rejected(format!("workload {name} not found")));
        }
        Ok(())
    }

    async fn is_running(&self, name: &str, _namespace: &str) -> Result<bool, PlatformError> {
        let answer = {
            let mut inner = self.inner.lock().unwrap();
            *inner.polls.entry(name.to_string()).or_insert(0) += 1;
            if inner.hung_status.contains(name) {
                None
            } else if !inner.workloads.contains_key(name) {
                return Err(rejected(format!("workload {name} not found")));
            } else {
                Some(match inner.running.get_mut(name) {
                    Some(script) if script.len() > 1 => script.pop_front().unwrap_or(true),
                    Some(script) => script.front().copied().unwrap_or(true),
                    None => true,
                })
            }
        };
        match answer {
            Some(running) => Ok(running),
            None => std::future::pending().await,
        }
    }

    async fn run_soak_io(&self, instance: &WorkloadInstance, io: SoakIo) -> Result<(), PlatformError> {
        let behavior = {
            let mut inner = self.inner.lock().unwrap();
            Self::enter(
                &mut inner,
                MockOp::RunSoakIo,
                PlatformCall::RunSoakIo(instance.name.clone()),
            )?;
            inner.soak_io.insert(instance.name.clone(), io);
            inner
                .run_behavior
                .get(&instance.name)
                .copied()
                .unwrap_or(RunBehavior::Normal)
        };

        match behavior {
            RunBehavior::Normal => {
                tokio::time::sleep(io.duration).await;
                Ok(())
            }
            RunBehavior::Silent => std::future::pending().await,
            RunBehavior::FailAfter(after) => {
                tokio::time::sleep(after).await;
                Err(rejected(format!("fio verify failed on {}", instance.name)))
            }
        }
    }
}
