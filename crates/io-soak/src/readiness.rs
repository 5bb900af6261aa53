//! Readiness tracking for a job population.
//!
//! Each job has a one-way latch: `NotReady -> Ready`. A job is polled only
//! while its latch is open; once it has been observed running it is never
//! queried again. Disruptor instances restart by design, so "has started at
//! least once" is the readiness we want, not "is running right now".

use crate::errors::SoakError;
use crate::job::SoakJob;
use crate::platform::WorkloadPlatform;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Interval between readiness polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the population readiness timeout.
pub const MIN_READY_TIMEOUT: Duration = Duration::from_secs(60);

const UNBOUNDED_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Readiness timeout for a population: `max(60s, allowance * job_count)`.
pub fn readiness_timeout(allowance: Duration, job_count: usize) -> Duration {
    let count = u32::try_from(job_count).unwrap_or(u32::MAX);
    allowance.saturating_mul(count).max(MIN_READY_TIMEOUT)
}

/// Per-job readiness latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    #[default]
    NotReady,
    Ready,
}

#[derive(Debug)]
struct Latch {
    name: String,
    namespace: String,
    state: Readiness,
    polls: u32,
}

/// Readiness latches for every job in a population.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    latches: Vec<Latch>,
}

impl ReadinessTracker {
    /// Track `(instance name, namespace)` pairs, all initially `NotReady`.
    pub fn new<I, N, S>(instances: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            latches: instances
                .into_iter()
                .map(|(name, namespace)| Latch {
                    name: name.into(),
                    namespace: namespace.into(),
                    state: Readiness::NotReady,
                    polls: 0,
                })
                .collect(),
        }
    }

    pub fn for_jobs(jobs: &[Arc<dyn SoakJob>]) -> Self {
        Self::new(
            jobs.iter()
                .map(|job| (job.name().to_string(), job.identity().namespace.clone())),
        )
    }

    pub fn len(&self) -> usize {
        self.latches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latches.is_empty()
    }

    pub fn all_ready(&self) -> bool {
        self.latches.iter().all(|l| l.state == Readiness::Ready)
    }

    pub fn state(&self, name: &str) -> Option<Readiness> {
        self.latches.iter().find(|l| l.name == name).map(|l| l.state)
    }

    /// Number of times the platform was queried for `name`.
    pub fn polls(&self, name: &str) -> Option<u32> {
        self.latches.iter().find(|l| l.name == name).map(|l| l.polls)
    }

    /// Names of jobs not yet observed running.
    pub fn pending(&self) -> Vec<String> {
        self.latches
            .iter()
            .filter(|l| l.state == Readiness::NotReady)
            .map(|l| l.name.clone())
            .collect()
    }

    /// Query every open latch once; returns whether all latches are now set.
    ///
    /// Platform errors count as "not running" for this tick.
    pub async fn poll_once(&mut self, platform: &dyn WorkloadPlatform) -> bool {
        for latch in self
            .latches
            .iter_mut()
            .filter(|l| l.state == Readiness::NotReady)
        {
            latch.polls += 1;
            match platform.is_running(&latch.name, &latch.namespace).await {
                Ok(true) => {
                    debug!(target: "soak.readiness", job = %latch.name, polls = latch.polls, "Job ready");
                    latch.state = Readiness::Ready;
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(target: "soak.readiness", job = %latch.name, error = %e, "Status query failed");
                }
            }
        }
        self.all_ready()
    }

    /// Poll once per [`POLL_INTERVAL`] until every latch is set or `timeout` elapses.
    ///
    /// The deadline also bounds each poll, so a status query that never
    /// returns cannot hold the wait open past `timeout`.
    #[instrument(skip_all, name = "soak.readiness.wait", fields(jobs = self.latches.len()))]
    pub async fn wait_until_ready(
        &mut self,
        platform: &dyn WorkloadPlatform,
        timeout: Duration,
        cancel_token: &CancellationToken,
    ) -> Result<(), SoakError> {
        info!(
            target: "soak.readiness",
            timeout_secs = timeout.as_secs(),
            jobs = self.latches.len(),
            "Waiting for jobs to be ready"
        );

        if self.all_ready() {
            return Ok(());
        }

        let start = Instant::now();
        // `Duration::MAX` overflows `Instant`.
        let deadline = start
            .checked_add(timeout)
            .unwrap_or_else(|| start + UNBOUNDED_WAIT);

        loop {
            tokio::select! {
                () = sleep(POLL_INTERVAL) => {}
                () = cancel_token.cancelled() => {
                    warn!(target: "soak.readiness", "Readiness wait cancelled");
                    return Err(SoakError::Interrupted { phase: "readiness wait" });
                }
            }

            let polled = tokio::select! {
                polled = timeout_at(deadline, self.poll_once(platform)) => polled,
                () = cancel_token.cancelled() => {
                    warn!(target: "soak.readiness", "Readiness wait cancelled during status query");
                    return Err(SoakError::Interrupted { phase: "readiness wait" });
                }
            };

            match polled {
                Ok(true) => {
                    info!(
                        target: "soak.readiness",
                        elapsed_secs = start.elapsed().as_secs(),
                        "All jobs ready"
                    );
                    return Ok(());
                }
                Ok(false) => {}
                Err(_) => {
                    debug!(target: "soak.readiness", "Status query outstanding at the deadline");
                }
            }

            if Instant::now() >= deadline {
                return Err(self.timed_out(timeout));
            }
        }
    }

    fn timed_out(&self, timeout: Duration) -> SoakError {
        let pending = self.pending();
        warn!(
            target: "soak.readiness",
            timeout_secs = timeout.as_secs(),
            pending = pending.len(),
            "Timed out waiting for jobs to be ready"
        );
        SoakError::ReadinessTimeout {
            timeout_secs: timeout.as_secs(),
            total: self.latches.len(),
            pending,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_floored_for_small_populations() {
        let allowance = Duration::from_secs(20);
        assert_eq!(readiness_timeout(allowance, 0), Duration::from_secs(60));
        assert_eq!(readiness_timeout(allowance, 1), Duration::from_secs(60));
        assert_eq!(readiness_timeout(allowance, 2), Duration::from_secs(60));
        assert_eq!(readiness_timeout(allowance, 3), Duration::from_secs(60));
    }

    #[test]
    fn test_timeout_scales_with_population() {
        let allowance = Duration::from_secs(20);
        assert_eq!(readiness_timeout(allowance, 5), Duration::from_secs(100));
        assert_eq!(readiness_timeout(allowance, 30), Duration::from_secs(600));
    }

    #[test]
    fn test_timeout_saturates_instead_of_overflowing() {
        let timeout = readiness_timeout(Duration::MAX, 2);
        assert_eq!(timeout, Duration::MAX);
    }

    #[test]
    fn test_new_tracker_starts_not_ready() {
        let tracker = ReadinessTracker::new([("a", "default"), ("b", "disrupt")]);
        assert_eq!(tracker.len(), 2);
        assert!(!tracker.all_ready());
        assert_eq!(tracker.state("a"), Some(Readiness::NotReady));
        assert_eq!(tracker.polls("b"), Some(0));
        assert_eq!(tracker.pending(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tracker.state("missing"), None);
    }

    #[test]
    fn test_empty_tracker_is_ready() {
        let tracker = ReadinessTracker::default();
        assert!(tracker.is_empty());
        assert!(tracker.all_ready());
    }
}
