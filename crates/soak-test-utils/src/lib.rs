//! # Soak Test Utilities
//!
//! Shared test utilities for the IO soak orchestrator.
//!
//! This crate provides an in-memory workload platform and fixtures for
//! exercising the orchestrator without a cluster.
//!
//! ## Modules
//!
//! - `mock_platform` - In-memory [`WorkloadPlatform`](io_soak::platform::WorkloadPlatform)
//!   with call recording, failure injection and scripted readiness
//! - `fixtures` - Job settings, jobs and populations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soak_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let mock = MockPlatform::new()
//!         .with_running_sequence("fio-disruptor-iosoak-disruptor-nvmf-3", [false, true]);
//!     let population = fs_population(&mock, 2);
//!     // Drive an Orchestrator...
//! }
//! ```

pub mod fixtures;
pub mod mock_platform;

pub use fixtures::*;
pub use mock_platform::*;
