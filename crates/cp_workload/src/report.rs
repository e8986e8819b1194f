//! JSON run report.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::WorkloadConfig;
use crate::counters::OperationCounter;
use crate::harness::{CpMapBenchmark, RunOutcome, WorkerFailure};
use crate::loader::PreloadOutcome;
use crate::verify::VerifyReport;

/// Everything a run produced, serialized for later comparison.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RunReport {
    pub name: String,
    pub config: WorkloadConfig,
    pub groups: Vec<String>,
    pub preload: Option<PreloadOutcome>,
    pub workers: Vec<OperationCounter>,
    pub total: OperationCounter,
    pub iterations: u64,
    pub elapsed_ms: u64,
    pub failures: Vec<WorkerFailure>,
    /// Per-map occupancy, also present when a map came up empty. Absent only
    /// when a read failed during the scan.
    pub verification: Option<VerifyReport>,
}

impl RunReport {
    pub fn new(
        bench: &CpMapBenchmark,
        preload: Option<PreloadOutcome>,
        outcome: &RunOutcome,
        verification: Option<VerifyReport>,
    ) -> Self {
        Self {
            name: bench.config().name.clone(),
            config: bench.config().clone(),
            groups: bench.groups().names().to_vec(),
            preload,
            workers: outcome.workers.clone(),
            total: outcome.aggregate.total,
            iterations: outcome.iterations,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            failures: outcome.failures.clone(),
            verification,
        }
    }
}

/// Serialize and write the report, creating parent directories as needed.
pub fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    let data = serde_json::to_vec_pretty(report).context("serialize run report")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
