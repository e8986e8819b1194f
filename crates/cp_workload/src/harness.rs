//! The benchmark pipeline: `setup` → `prepare` → `run` → `verify`.
//!
//! A driver calls the phases in order. Setup publishes the immutable
//! [`Workload`] before any worker is spawned; every later phase only reads it.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use cp_store::CpSubsystem;

use crate::config::{RunBudget, WorkloadConfig};
use crate::counters::{CounterAggregate, OperationCounter};
use crate::dataset::{initial_value, KeyDomain, ValuePool};
use crate::dispatch::{run_worker, DispatchTable, OpKind, WorkerContext, WorkerResult, Workload};
use crate::groups::GroupSet;
use crate::loader::{BulkLoader, PreloadOutcome};
use crate::registry::MapRegistry;
use crate::verify::{self, VerifyReport};

/// A worker that stopped before its budget was spent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: usize,
    pub error: String,
}

/// Result of the workload phase, with counters in worker order.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub workers: Vec<OperationCounter>,
    pub aggregate: CounterAggregate,
    pub iterations: u64,
    pub elapsed: Duration,
    pub failures: Vec<WorkerFailure>,
}

impl RunOutcome {
    fn from_results(mut results: Vec<WorkerResult>, elapsed: Duration) -> Self {
        results.sort_by_key(|r| r.worker);
        let workers = results.iter().map(|r| r.counter).collect::<Vec<_>>();
        let aggregate = CounterAggregate::fold(&workers);
        let iterations = results.iter().map(|r| r.iterations).sum();
        let failures = results
            .into_iter()
            .filter_map(|r| {
                r.error.map(|err| WorkerFailure {
                    worker: r.worker,
                    error: format!("{err:#}"),
                })
            })
            .collect();
        Self {
            workers,
            aggregate,
            iterations,
            elapsed,
            failures,
        }
    }
}

/// Weighted CP map workload against a set of maps spread over CP groups.
pub struct CpMapBenchmark {
    config: WorkloadConfig,
    groups: GroupSet,
    workload: Arc<Workload>,
}

impl CpMapBenchmark {
    /// Generate the dataset, place the maps and acquire their proxies.
    /// Any failure here aborts the run before anything is written.
    pub async fn setup(config: WorkloadConfig, store: &dyn CpSubsystem) -> anyhow::Result<Self> {
        config.validate()?;

        tracing::info!(keys = config.keys, mode = ?config.key_mode, "generating keys");
        let keys = KeyDomain::build(
            config.key_mode,
            config.keys,
            config.key_size_bytes,
            config.seed,
        )
        .context("generate key pool")?;
        let values = ValuePool::generate(config.values_count, config.value_size_bytes, config.seed);

        let groups = GroupSet::compute(config.cp_groups);
        let maps = MapRegistry::build(store, config.maps, &groups)?;
        tracing::info!(
            maps = maps.len(),
            groups = groups.len(),
            "created CP map proxies"
        );

        let table = DispatchTable::new(&config.weights)?;
        for kind in OpKind::ALL {
            let probability = table.probability(kind);
            if probability > 0.0 {
                tracing::info!(op = kind.as_str(), probability, "operation mix");
            }
        }

        if !config.stabilize.is_zero() {
            tracing::info!(
                wait = %humantime::format_duration(config.stabilize),
                "waiting for the CP subsystem to stabilize"
            );
            tokio::time::sleep(config.stabilize).await;
        }

        let workload = Workload {
            maps,
            keys,
            values,
            table,
            map_selection: config.map_selection,
        };
        Ok(Self {
            config,
            groups,
            workload: Arc::new(workload),
        })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn groups(&self) -> &GroupSet {
        &self.groups
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    /// Preload every key of every map when `fill_on_prepare` is set.
    pub async fn prepare(&self) -> Option<PreloadOutcome> {
        self.prepare_with_shutdown(std::future::pending()).await
    }

    pub async fn prepare_with_shutdown<F>(&self, shutdown: F) -> Option<PreloadOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        if !self.config.fill_on_prepare {
            tracing::info!("fill_on_prepare disabled; skipping preload");
            return None;
        }
        let loader = BulkLoader::new(self.config.preload_threads, self.config.preload_timeout);
        let value = initial_value(self.config.value_size_bytes, self.config.seed);
        let outcome = loader
            .preload_with_shutdown(&self.workload.maps, &self.workload.keys, value, shutdown)
            .await;
        Some(outcome)
    }

    /// Spawn one worker per configured thread and collect their counters.
    pub async fn run(&self, budget: RunBudget) -> anyhow::Result<RunOutcome> {
        let name = &self.config.name;
        tracing::info!(threads = self.config.threads, ?budget, "{name}: starting workload");

        let start = Instant::now();
        let mut tasks = Vec::with_capacity(self.config.threads);
        for worker in 0..self.config.threads {
            let workload = self.workload.clone();
            let ctx = WorkerContext::new(worker, self.config.seed);
            tasks.push(tokio::spawn(run_worker(workload, ctx, budget)));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (worker, task) in tasks.into_iter().enumerate() {
            results.push(task.await.with_context(|| format!("worker {worker} panicked"))?);
        }
        let outcome = RunOutcome::from_results(results, start.elapsed());
        tracing::info!(
            iterations = outcome.iterations,
            elapsed = ?outcome.elapsed,
            failed_workers = outcome.failures.len(),
            "{name}: workload finished"
        );

        if let Some(failure) = outcome.failures.first() {
            if self.config.fail_fast {
                anyhow::bail!(
                    "{name}: worker {} failed ({} of {} workers failed): {}",
                    failure.worker,
                    outcome.failures.len(),
                    self.config.threads,
                    failure.error
                );
            }
            for failure in &outcome.failures {
                tracing::warn!(
                    worker = failure.worker,
                    error = %failure.error,
                    "{name}: worker failed"
                );
            }
        }
        Ok(outcome)
    }

    /// Report the aggregate and count the surviving entries of every map.
    /// Only a failed read is an error here; empty maps are left to
    /// [`VerifyReport::check`].
    pub async fn scan(&self, outcome: &RunOutcome) -> anyhow::Result<VerifyReport> {
        let name = &self.config.name;
        tracing::info!("{name}: {}", outcome.aggregate);
        verify::scan(name, &self.workload.maps, &self.workload.keys)
            .await
            .context("scan CP maps")
    }

    /// Scan every map and fail if any of them ended up empty.
    pub async fn verify(&self, outcome: &RunOutcome) -> anyhow::Result<VerifyReport> {
        let report = self.scan(outcome).await?;
        report.check(&self.config.name, &outcome.aggregate)?;
        Ok(report)
    }
}
