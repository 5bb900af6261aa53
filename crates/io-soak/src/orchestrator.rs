//! Population orchestrator.
//!
//! Drives a job population through three coarse phases, each callable once
//! and in order:
//!
//! 1. [`Orchestrator::setup`] - storage classes, isolation namespaces,
//!    volumes, workload instances, then the readiness wait. Any failure is
//!    fatal; no partial population is ever run.
//! 2. [`Orchestrator::run_soak`] - one worker per job for the soak duration,
//!    results fanned in over a done channel and an error channel.
//! 3. [`Orchestrator::teardown`] - instances, then volumes, then storage
//!    classes, then namespaces. Every removal is attempted; failures are
//!    collected and reported together.
//!
//! Teardown only removes what setup actually created, so it is also valid
//! after a failed setup.

use crate::aggregator::{ResultAggregator, RunOutcome};
use crate::config::Config;
use crate::errors::{JobError, SoakError, TeardownFailure};
use crate::job::SoakJob;
use crate::platform::WorkloadPlatform;
use crate::population::Population;
use crate::readiness::{readiness_timeout, ReadinessTracker};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Orchestrator timing and placement settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Placement constraint shared by every workload instance.
    pub node_selector: BTreeMap<String, String>,
    /// Readiness allowance per job.
    pub pod_ready_allowance: Duration,
    /// Extra time to wait for run signals after the soak duration.
    pub signal_grace: Duration,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            node_selector: config.node_selector.clone(),
            pod_ready_allowance: config.pod_ready_allowance,
            signal_grace: config.signal_grace,
        }
    }
}

/// Lifecycle position of the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    New,
    SetupFailed,
    Ready,
    Ran,
    TornDown,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::New => "new",
            Phase::SetupFailed => "setup-failed",
            Phase::Ready => "ready",
            Phase::Ran => "ran",
            Phase::TornDown => "torn-down",
        }
    }
}

/// Resources created during setup, in creation order.
#[derive(Default)]
struct Created {
    storage_classes: Vec<String>,
    namespaces: Vec<String>,
    volumes: Vec<Arc<dyn SoakJob>>,
    instances: Vec<Arc<dyn SoakJob>>,
}

/// Owns a job population for its whole lifetime.
pub struct Orchestrator {
    platform: Arc<dyn WorkloadPlatform>,
    population: Population,
    settings: OrchestratorSettings,
    cancel_token: CancellationToken,
    phase: Phase,
    created: Created,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn WorkloadPlatform>,
        population: Population,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            platform,
            population,
            settings,
            cancel_token: CancellationToken::new(),
            phase: Phase::New,
            created: Created::default(),
        }
    }

    /// Use `cancel_token` to interrupt the readiness wait and run collection.
    ///
    /// Teardown is never interrupted.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    fn require_phase(
        &self,
        operation: &'static str,
        allowed: &[Phase],
    ) -> Result<(), SoakError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SoakError::PhaseOrder {
                operation,
                state: self.phase.as_str(),
            })
        }
    }

    /// Create every resource and wait for the population to become ready.
    #[instrument(skip_all, name = "soak.orchestrator.setup", fields(jobs = self.population.len()))]
    pub async fn setup(&mut self) -> Result<(), SoakError> {
        self.require_phase("setup", &[Phase::New])?;
        self.phase = Phase::SetupFailed;

        let result = self.setup_inner().await;
        match &result {
            Ok(()) => {
                self.phase = Phase::Ready;
                info!(target: "soak.orchestrator", jobs = self.population.len(), "Setup complete");
            }
            Err(e) => {
                error!(target: "soak.orchestrator", error = %e, "Setup failed");
            }
        }
        result
    }

    async fn setup_inner(&mut self) -> Result<(), SoakError> {
        for class in self.population.referenced_storage_classes() {
            info!(
                target: "soak.orchestrator",
                storage_class = %class.name,
                protocol = %class.protocol,
                replicas = class.replicas,
                "Creating storage class"
            );
            self.platform
                .create_storage_class(class)
                .await
                .map_err(|source| SoakError::StorageClass {
                    name: class.name.clone(),
                    source,
                })?;
            self.created.storage_classes.push(class.name.clone());
        }

        for namespace in self.population.isolated_namespaces() {
            info!(target: "soak.orchestrator", namespace = %namespace, "Creating namespace");
            self.platform
                .create_namespace(&namespace)
                .await
                .map_err(|source| SoakError::Namespace {
                    name: namespace.clone(),
                    source,
                })?;
            self.created.namespaces.push(namespace);
        }

        for job in &self.population.jobs {
            job.make_volume()
                .await
                .map_err(|source| SoakError::Volume {
                    job: job.name().to_string(),
                    source,
                })?;
            self.created.volumes.push(Arc::clone(job));
        }

        info!(target: "soak.orchestrator", jobs = self.population.len(), "Creating workload instances");
        for job in &self.population.jobs {
            job.make_workload_instance(&self.settings.node_selector)
                .await
                .map_err(|source| SoakError::WorkloadInstance {
                    job: job.name().to_string(),
                    source,
                })?;
            self.created.instances.push(Arc::clone(job));
        }

        let timeout = readiness_timeout(self.settings.pod_ready_allowance, self.population.len());
        let mut tracker = ReadinessTracker::for_jobs(&self.population.jobs);
        tracker
            .wait_until_ready(self.platform.as_ref(), timeout, &self.cancel_token)
            .await
    }

    /// Run every job concurrently for `duration` and aggregate the results.
    ///
    /// Individual job failures never abort the run; they are collected into
    /// the returned [`RunOutcome`].
    #[instrument(skip_all, name = "soak.orchestrator.run", fields(jobs = self.population.len()))]
    pub async fn run_soak(&mut self, duration: Duration) -> Result<RunOutcome, SoakError> {
        self.require_phase("run_soak", &[Phase::Ready])?;
        self.phase = Phase::Ran;

        let count = self.population.len();
        let (done_tx, done_rx) = mpsc::channel::<String>(count.max(1));
        let (err_tx, err_rx) = mpsc::channel::<JobError>(count.max(1));

        info!(
            target: "soak.orchestrator",
            jobs = count,
            duration_secs = duration.as_secs(),
            "Starting soak run"
        );

        let workers: Vec<_> = self
            .population
            .jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                let done_tx = done_tx.clone();
                let err_tx = err_tx.clone();
                tokio::spawn(async move { job.run(duration, done_tx, err_tx).await })
            })
            .collect();

        // Only workers hold senders now; collection sees closure if they all exit.
        drop(done_tx);
        drop(err_tx);

        let deadline = Instant::now() + duration + self.settings.signal_grace;
        let names = self
            .population
            .jobs
            .iter()
            .map(|job| job.name().to_string())
            .collect();
        let outcome = ResultAggregator::new(names)
            .collect(done_rx, err_rx, deadline, &self.cancel_token)
            .await;

        let stragglers = workers.iter().filter(|w| !w.is_finished()).count();
        if stragglers > 0 {
            warn!(target: "soak.orchestrator", stragglers, "Aborting workers still running after collection");
        }
        for worker in &workers {
            worker.abort();
        }

        info!(
            target: "soak.orchestrator",
            passed = outcome.passed,
            completed = outcome.completed.len(),
            failed = outcome.failures.len(),
            "Soak run finished"
        );

        Ok(outcome)
    }

    /// Remove every created resource, attempting each removal even after failures.
    #[instrument(skip_all, name = "soak.orchestrator.teardown")]
    pub async fn teardown(&mut self) -> Result<(), SoakError> {
        self.require_phase("teardown", &[Phase::SetupFailed, Phase::Ready, Phase::Ran])?;
        self.phase = Phase::TornDown;

        let created = std::mem::take(&mut self.created);
        let mut failures = Vec::new();

        let mut live_instances: HashSet<String> = HashSet::new();
        for job in &created.instances {
            if let Err(e) = job.remove_workload_instance().await {
                warn!(target: "soak.orchestrator", job = %job.name(), error = %e, "Failed to remove workload instance");
                failures.push(TeardownFailure {
                    resource: format!("workload instance {}/{}", job.identity().namespace, job.name()),
                    cause: e.to_string(),
                });
                live_instances.insert(job.name().to_string());
            }
        }

        info!(target: "soak.orchestrator", volumes = created.volumes.len(), "Removing volumes");
        let mut live_volumes: Vec<&Arc<dyn SoakJob>> = Vec::new();
        for job in &created.volumes {
            let resource = format!("volume {}/{}", job.identity().namespace, job.identity().volume_name);
            if live_instances.contains(job.name()) {
                failures.push(TeardownFailure {
                    resource,
                    cause: "skipped: workload instance still exists".to_string(),
                });
                live_volumes.push(job);
                continue;
            }
            if let Err(e) = job.remove_volume().await {
                warn!(target: "soak.orchestrator", job = %job.name(), error = %e, "Failed to remove volume");
                failures.push(TeardownFailure {
                    resource,
                    cause: e.to_string(),
                });
                live_volumes.push(job);
            }
        }

        for class in &created.storage_classes {
            let resource = format!("storage class {class}");
            if live_volumes
                .iter()
                .any(|job| &job.identity().storage_class == class)
            {
                failures.push(TeardownFailure {
                    resource,
                    cause: "skipped: volumes still reference it".to_string(),
                });
                continue;
            }
            if let Err(e) = self.platform.delete_storage_class(class).await {
                warn!(target: "soak.orchestrator", storage_class = %class, error = %e, "Failed to remove storage class");
                failures.push(TeardownFailure {
                    resource,
                    cause: e.to_string(),
                });
            }
        }

        for namespace in &created.namespaces {
            let resource = format!("namespace {namespace}");
            let occupied = live_volumes
                .iter()
                .any(|job| &job.identity().namespace == namespace)
                || created.instances.iter().any(|job| {
                    live_instances.contains(job.name()) && &job.identity().namespace == namespace
                });
            if occupied {
                failures.push(TeardownFailure {
                    resource,
                    cause: "skipped: instances or volumes still exist in it".to_string(),
                });
                continue;
            }
            if let Err(e) = self.platform.delete_namespace(namespace).await {
                warn!(target: "soak.orchestrator", namespace = %namespace, error = %e, "Failed to remove namespace");
                failures.push(TeardownFailure {
                    resource,
                    cause: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            info!(target: "soak.orchestrator", "Teardown complete");
            Ok(())
        } else {
            warn!(target: "soak.orchestrator", failures = failures.len(), "Teardown left resources behind");
            Err(SoakError::Teardown { failures })
        }
    }
}
