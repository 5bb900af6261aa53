//! Job population construction.
//!
//! A population is the set of storage classes plus every job that uses them.
//! Soak jobs are spread round-robin over one storage class per protocol,
//! alternating filesystem (odd ids) and raw block (even ids) volumes.
//! Disruptor jobs get their own storage classes and are numbered from 1; the
//! class in their name keeps them distinct from soak jobs.
//!
//! Job names key the run-phase signals, so they must be unique.

use crate::config::Config;
use crate::errors::SoakError;
use crate::job::{
    DisruptorJob, FilesystemSoakJob, JobSettings, RawBlockSoakJob, SoakJob,
};
use crate::platform::{StorageClassSpec, WorkloadPlatform};
use std::collections::HashSet;
use std::sync::Arc;

/// Storage class name for soak jobs using `protocol`.
pub fn soak_storage_class_name(protocol: &str) -> String {
    format!("io-soak-{protocol}")
}

/// Storage class name for disruptor jobs using `protocol`.
pub fn disruptor_storage_class_name(protocol: &str) -> String {
    format!("iosoak-disruptor-{protocol}")
}

/// Storage classes and the jobs referencing them.
pub struct Population {
    pub storage_classes: Vec<StorageClassSpec>,
    pub jobs: Vec<Arc<dyn SoakJob>>,
}

impl Population {
    /// Returns [`SoakError::DuplicateJob`] if two jobs share a name.
    pub fn new(
        storage_classes: Vec<StorageClassSpec>,
        jobs: Vec<Arc<dyn SoakJob>>,
    ) -> Result<Self, SoakError> {
        let mut seen = HashSet::with_capacity(jobs.len());
        for job in &jobs {
            if !seen.insert(job.name()) {
                return Err(SoakError::DuplicateJob {
                    name: job.name().to_string(),
                });
            }
        }
        Ok(Self {
            storage_classes,
            jobs,
        })
    }

    /// Build the population described by `config`.
    pub fn from_config(config: &Config, platform: Arc<dyn WorkloadPlatform>) -> Self {
        let settings = Arc::new(JobSettings {
            image: config.fio_image(),
            volume_size_mb: config.volume_size_mb,
            fio_size_mb: config.fio_size_mb,
            duty_cycles: config.duty_cycles.clone(),
        });

        let soak_classes: Vec<StorageClassSpec> = config
            .protocols
            .iter()
            .map(|protocol| StorageClassSpec {
                name: soak_storage_class_name(protocol.as_str()),
                protocol: *protocol,
                replicas: config.replicas,
            })
            .collect();

        let soak_count = config.soak_job_count();
        let mut jobs: Vec<Arc<dyn SoakJob>> = Vec::with_capacity(soak_count + config.disruptor_count);

        for (id, class) in (1..=soak_count).zip(soak_classes.iter().cycle()) {
            let job: Arc<dyn SoakJob> = if id % 2 == 0 {
                Arc::new(RawBlockSoakJob::new(
                    &class.name,
                    &config.namespace,
                    id,
                    config.duration,
                    Arc::clone(&platform),
                    Arc::clone(&settings),
                ))
            } else {
                Arc::new(FilesystemSoakJob::new(
                    &class.name,
                    &config.namespace,
                    id,
                    config.duration,
                    Arc::clone(&platform),
                    Arc::clone(&settings),
                ))
            };
            jobs.push(job);
        }

        let mut storage_classes = soak_classes;

        if config.disruptor_count > 0 {
            let disruptor_classes: Vec<StorageClassSpec> = config
                .protocols
                .iter()
                .map(|protocol| StorageClassSpec {
                    name: disruptor_storage_class_name(protocol.as_str()),
                    protocol: *protocol,
                    replicas: config.replicas,
                })
                .collect();

            let ids = 1..=config.disruptor_count;
            for (id, class) in ids.zip(disruptor_classes.iter().cycle()) {
                jobs.push(Arc::new(DisruptorJob::new(
                    &class.name,
                    &config.disruptor_namespace,
                    id,
                    config.fault_after,
                    Arc::clone(&platform),
                    Arc::clone(&settings),
                )));
            }

            storage_classes.extend(disruptor_classes);
        }

        // Soak ids are distinct and disruptor names carry their own class prefix.
        Self {
            storage_classes,
            jobs,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Storage classes referenced by at least one job.
    pub fn referenced_storage_classes(&self) -> Vec<&StorageClassSpec> {
        self.storage_classes
            .iter()
            .filter(|class| {
                self.jobs
                    .iter()
                    .any(|job| job.identity().storage_class == class.name)
            })
            .collect()
    }

    /// Distinct isolation namespaces required by the jobs, in first-use order.
    pub fn isolated_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = Vec::new();
        for ns in self.jobs.iter().filter_map(|job| job.isolated_namespace()) {
            if !namespaces.iter().any(|existing| existing == ns) {
                namespaces.push(ns.to_string());
            }
        }
        namespaces
    }
}
