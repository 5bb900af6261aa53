//! IO soak error types.
//!
//! Errors are split by the phase that produces them:
//! - [`SoakError`] setup/teardown failures, returned synchronously to the caller
//! - [`JobError`] per-job run failures, delivered over the error channel
//! - [`PlatformError`] failures reported by the workload platform

use std::fmt;
use thiserror::Error;

/// Workload platform operation failed.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform command could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Input could not be written to a command that otherwise succeeded.
    #[error("Failed to write input to `{command}`: {source}")]
    Stdin {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The platform command ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// A resource manifest could not be serialized.
    #[error("Manifest serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The platform refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// A resource left behind (or skipped) during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    /// Resource description, e.g. `volume default/fio-filesystem-io-soak-nvmf-1`.
    pub resource: String,
    /// Why removal failed or was skipped.
    pub cause: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.cause)
    }
}

/// Orchestrator error type.
///
/// Setup variants are fatal and abort before the run phase starts.
/// `Teardown` is reported after every removal has been attempted.
#[derive(Debug, Error)]
pub enum SoakError {
    #[error("Setup failed creating storage class {name}: {source}")]
    StorageClass {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("Setup failed creating namespace {name}: {source}")]
    Namespace {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("Setup failed creating volume for job {job}: {source}")]
    Volume {
        job: String,
        #[source]
        source: PlatformError,
    },

    #[error("Setup failed creating workload instance for job {job}: {source}")]
    WorkloadInstance {
        job: String,
        #[source]
        source: PlatformError,
    },

    #[error(
        "Setup failed: timed out after {timeout_secs}s waiting for {} of {total} jobs to be ready: {}",
        .pending.len(),
        .pending.join(", ")
    )]
    ReadinessTimeout {
        timeout_secs: u64,
        total: usize,
        pending: Vec<String>,
    },

    #[error("Population has more than one job named {name}")]
    DuplicateJob { name: String },

    #[error("{phase} interrupted by shutdown signal")]
    Interrupted { phase: &'static str },

    #[error("{operation} called out of order (population is {state})")]
    PhaseOrder {
        operation: &'static str,
        state: &'static str,
    },

    #[error(
        "Teardown left {} resource(s) behind: {}",
        .failures.len(),
        .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    Teardown { failures: Vec<TeardownFailure> },
}

/// A single job's run-phase failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("job {job} failed: {cause}")]
pub struct JobError {
    /// Workload instance name of the failed job.
    pub job: String,
    /// Human readable cause.
    pub cause: String,
}

impl JobError {
    pub fn new(job: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_timeout_names_pending_jobs() {
        let err = SoakError::ReadinessTimeout {
            timeout_secs: 60,
            total: 3,
            pending: vec!["fio-a".to_string(), "fio-b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("60s"));
        assert!(msg.contains("2 of 3"));
        assert!(msg.contains("fio-a, fio-b"));
    }

    #[test]
    fn test_teardown_error_lists_every_failure() {
        let err = SoakError::Teardown {
            failures: vec![
                TeardownFailure {
                    resource: "volume default/v1".to_string(),
                    cause: "busy".to_string(),
                },
                TeardownFailure {
                    resource: "storage class sc".to_string(),
                    cause: "skipped".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Teardown left 2 resource(s) behind"));
        assert!(msg.contains("volume default/v1: busy"));
        assert!(msg.contains("storage class sc: skipped"));
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::new("fio-disruptor-x-3", "fio exited with 1");
        assert_eq!(
            err.to_string(),
            "job fio-disruptor-x-3 failed: fio exited with 1"
        );
    }
}
