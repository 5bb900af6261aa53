//! IO Soak Orchestrator Library
//!
//! Runs a population of long-lived fio jobs against a replicated block
//! storage backend, kills a subset of them on purpose, and aggregates the
//! outcome of the whole population within a bounded duration.
//!
//! # Lifecycle
//!
//! ```text
//! Population::from_config
//! └── Orchestrator
//!     ├── setup      storage classes -> namespaces -> volumes -> instances -> readiness
//!     ├── run_soak   one worker per job, fan-in over done/error channels
//!     └── teardown   instances -> volumes -> storage classes -> namespaces
//! ```
//!
//! # Modules
//!
//! - [`platform`] - Workload platform trait and the `kubectl` implementation
//! - [`job`] - Filesystem, raw block and disruptor job variants
//! - [`population`] - Builds the job population from configuration
//! - [`readiness`] - Per-job readiness latches and the readiness wait
//! - [`aggregator`] - Run-phase result collection
//! - [`orchestrator`] - Phase sequencing and best-effort teardown
//! - [`report`] - JSON run report

pub mod aggregator;
pub mod config;
pub mod duty_cycle;
pub mod errors;
pub mod fio;
pub mod job;
pub mod orchestrator;
pub mod platform;
pub mod population;
pub mod readiness;
pub mod report;
