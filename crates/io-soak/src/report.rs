//! Soak run report.

use crate::aggregator::RunOutcome;
use crate::errors::{JobError, SoakError};
use crate::job::JobKind;
use crate::population::Population;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// One job in the population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub kind: JobKind,
    pub storage_class: String,
    pub namespace: String,
}

/// Machine-readable summary of one soak run.
#[derive(Debug, Clone, Serialize)]
pub struct SoakReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub jobs: Vec<JobSummary>,
    /// Fatal setup error; the run phase never started when set.
    pub setup_error: Option<String>,
    /// The run phase could not be carried out.
    pub run_error: Option<String>,
    pub passed: bool,
    pub completed: Vec<String>,
    pub failures: Vec<JobError>,
    pub teardown_warnings: Vec<String>,
}

impl SoakReport {
    /// Start a report for `population`, stamped with the current time.
    pub fn start(population: &Population, duration: Duration) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            duration_secs: duration.as_secs(),
            jobs: population
                .jobs
                .iter()
                .map(|job| JobSummary {
                    name: job.name().to_string(),
                    kind: job.kind(),
                    storage_class: job.identity().storage_class.clone(),
                    namespace: job.identity().namespace.clone(),
                })
                .collect(),
            setup_error: None,
            run_error: None,
            passed: false,
            completed: Vec::new(),
            failures: Vec::new(),
            teardown_warnings: Vec::new(),
        }
    }

    pub fn record_setup_error(&mut self, error: &SoakError) {
        self.setup_error = Some(error.to_string());
        self.passed = false;
    }

    pub fn record_run_error(&mut self, error: &SoakError) {
        self.run_error = Some(error.to_string());
        self.passed = false;
    }

    pub fn record_outcome(&mut self, outcome: RunOutcome) {
        self.passed = outcome.passed && self.setup_error.is_none() && self.run_error.is_none();
        self.completed = outcome.completed;
        self.failures = outcome.failures;
    }

    /// Attach teardown failures as warnings. They never change the verdict.
    pub fn record_teardown(&mut self, result: Result<(), SoakError>) {
        match result {
            Ok(()) => {}
            Err(SoakError::Teardown { failures }) => {
                self.teardown_warnings
                    .extend(failures.iter().map(ToString::to_string));
            }
            Err(other) => self.teardown_warnings.push(other.to_string()),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
