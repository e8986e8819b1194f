//! Workload generator and verifier for CP maps.
//!
//! Provisions a set of maps spread round-robin over consensus groups, drives
//! concurrent workers through a weighted mix of map operations, folds the
//! per-worker counters into one report and finally checks that no map ended
//! up empty. The store itself is reached through the `cp_store` traits.

pub mod config;
pub mod counters;
pub mod dataset;
pub mod dispatch;
pub mod groups;
pub mod harness;
pub mod loader;
pub mod registry;
pub mod report;
pub mod rng;
pub mod verify;

pub use config::{KeyMode, MapSelection, OperationWeights, RunBudget, WorkloadConfig};
pub use counters::{CounterAggregate, OperationCounter};
pub use dispatch::OpKind;
pub use groups::GroupSet;
pub use harness::{CpMapBenchmark, RunOutcome, WorkerFailure};
pub use loader::{BulkLoader, PreloadOutcome, PreloadStatus};
pub use report::{write_report, RunReport};
pub use verify::VerifyReport;
