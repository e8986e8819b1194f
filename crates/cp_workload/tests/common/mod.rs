//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use cp_store::MemoryCpSubsystem;
use cp_workload::{CpMapBenchmark, OperationWeights, WorkloadConfig};

/// Small, iteration-bounded configuration that finishes quickly.
pub fn small_config() -> WorkloadConfig {
    WorkloadConfig {
        name: "CpMapTest".to_string(),
        maps: 2,
        keys: 100,
        values_count: 16,
        value_size_bytes: 32,
        threads: 4,
        iterations: Some(200),
        preload_threads: 4,
        preload_timeout: Duration::from_secs(30),
        ..WorkloadConfig::default()
    }
}

/// Every operation enabled, reads and writes weighted heavier than removals.
pub fn mixed_weights() -> OperationWeights {
    OperationWeights {
        get: 1.0,
        put: 1.0,
        put_if_absent: 1.0,
        set: 1.0,
        remove: 0.2,
        delete: 0.2,
        cas: 1.0,
        set_then_delete: 0.2,
    }
}

pub async fn setup(store: &MemoryCpSubsystem, config: WorkloadConfig) -> CpMapBenchmark {
    CpMapBenchmark::setup(config, store)
        .await
        .expect("benchmark setup")
}
