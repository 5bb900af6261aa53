//! Run-phase result aggregation.
//!
//! Workers report on two channels: job names on the done channel and
//! [`JobError`]s on the error channel. The aggregator waits for exactly one
//! signal per expected job, bounded by a deadline. Jobs that have not
//! signalled when collection stops are recorded as failures, so the verdict
//! never passes with unaccounted jobs.

use crate::errors::JobError;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Terminal signal from one job's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSignal {
    Done(String),
    Failed(JobError),
}

impl RunSignal {
    pub fn job(&self) -> &str {
        match self {
            RunSignal::Done(job) => job,
            RunSignal::Failed(err) => &err.job,
        }
    }
}

/// Verdict of a run phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// True iff no job failed.
    pub passed: bool,
    /// Jobs that completed, in arrival order.
    pub completed: Vec<String>,
    /// Every failure, in arrival order; unsignalled jobs last.
    pub failures: Vec<JobError>,
}

/// Why collection stopped before every job signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cutoff {
    Deadline,
    Cancelled,
    ChannelsClosed,
}

/// Collects run signals into a [`RunOutcome`].
#[derive(Debug)]
pub struct ResultAggregator {
    expected: Vec<String>,
    received: HashSet<String>,
    completed: Vec<String>,
    failures: Vec<JobError>,
}

impl ResultAggregator {
    /// Expect one signal from each named job.
    pub fn new(expected: Vec<String>) -> Self {
        Self {
            expected,
            received: HashSet::new(),
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Record a signal. A second signal from the same job is ignored.
    pub fn record(&mut self, signal: RunSignal) {
        if !self.received.insert(signal.job().to_string()) {
            warn!(target: "soak.aggregator", job = %signal.job(), "Ignoring duplicate run signal");
            return;
        }

        match signal {
            RunSignal::Done(job) => {
                info!(target: "soak.aggregator", job = %job, "Job completed");
                self.completed.push(job);
            }
            RunSignal::Failed(err) => {
                warn!(target: "soak.aggregator", job = %err.job, cause = %err.cause, "Job failed");
                self.failures.push(err);
            }
        }
    }

    /// Expected jobs that have not signalled yet.
    pub fn outstanding(&self) -> Vec<String> {
        self.expected
            .iter()
            .filter(|job| !self.received.contains(*job))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.expected.iter().all(|job| self.received.contains(job))
    }

    /// Drain both channels until every expected job has signalled, `deadline`
    /// passes, or `cancel_token` fires.
    pub async fn collect(
        mut self,
        mut done_rx: mpsc::Receiver<String>,
        mut err_rx: mpsc::Receiver<JobError>,
        deadline: Instant,
        cancel_token: &CancellationToken,
    ) -> RunOutcome {
        let mut done_open = true;
        let mut err_open = true;

        let cutoff = loop {
            if self.is_complete() {
                break None;
            }
            if !done_open && !err_open {
                break Some(Cutoff::ChannelsClosed);
            }

            tokio::select! {
                msg = done_rx.recv(), if done_open => match msg {
                    Some(job) => self.record(RunSignal::Done(job)),
                    None => done_open = false,
                },
                msg = err_rx.recv(), if err_open => match msg {
                    Some(err) => self.record(RunSignal::Failed(err)),
                    None => err_open = false,
                },
                () = sleep_until(deadline) => break Some(Cutoff::Deadline),
                () = cancel_token.cancelled() => break Some(Cutoff::Cancelled),
            }
        };

        if let Some(cutoff) = cutoff {
            let cause = match cutoff {
                Cutoff::Deadline => "no completion signal before the run deadline",
                Cutoff::Cancelled => "run interrupted before the job signalled",
                Cutoff::ChannelsClosed => "worker exited without signalling",
            };
            let outstanding = self.outstanding();
            warn!(
                target: "soak.aggregator",
                outstanding = outstanding.len(),
                cause,
                "Run collection stopped early"
            );
            for job in outstanding {
                self.record(RunSignal::Failed(JobError::new(job, cause)));
            }
        }

        self.finish()
    }

    /// Produce the verdict from the signals recorded so far.
    pub fn finish(self) -> RunOutcome {
        RunOutcome {
            passed: self.failures.is_empty(),
            completed: self.completed,
            failures: self.failures,
        }
    }
}
