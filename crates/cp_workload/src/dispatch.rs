//! Weighted operation dispatch and the per-worker execution loop.
//!
//! Each worker owns a [`WorkerContext`] (its RNG, its counter and its map
//! cursor) and shares only the immutable [`Workload`] with the others, so the
//! hot path takes no locks. Per iteration the worker samples an operation from
//! the [`DispatchTable`], picks a map and a key, issues the call and records it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{MapSelection, OperationWeights, RunBudget};
use crate::counters::OperationCounter;
use crate::dataset::{KeyDomain, ValuePool};
use crate::registry::{MapHandle, MapRegistry};
use crate::rng;

/// Iterations between cooperative yields of a worker loop.
const YIELD_EVERY: u64 = 64;

/// Operation issued by a workload iteration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Get,
    Put,
    PutIfAbsent,
    Set,
    Remove,
    Delete,
    Cas,
    SetThenDelete,
}

impl OpKind {
    pub const ALL: [OpKind; 8] = [
        OpKind::Get,
        OpKind::Put,
        OpKind::PutIfAbsent,
        OpKind::Set,
        OpKind::Remove,
        OpKind::Delete,
        OpKind::Cas,
        OpKind::SetThenDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Get => "get",
            OpKind::Put => "put",
            OpKind::PutIfAbsent => "putIfAbsent",
            OpKind::Set => "set",
            OpKind::Remove => "remove",
            OpKind::Delete => "delete",
            OpKind::Cas => "cas",
            OpKind::SetThenDelete => "setThenDelete",
        }
    }
}

/// Discrete distribution over the operations with a positive weight.
#[derive(Clone, Debug)]
pub struct DispatchTable {
    entries: Vec<(f64, OpKind)>,
    dist: WeightedIndex<f64>,
}

impl DispatchTable {
    pub fn new(weights: &OperationWeights) -> anyhow::Result<Self> {
        weights.validate()?;
        let entries = OpKind::ALL
            .into_iter()
            .map(|kind| (weights.weight(kind), kind))
            .filter(|(weight, _)| *weight > 0.0)
            .collect::<Vec<_>>();
        let dist = WeightedIndex::new(entries.iter().map(|(weight, _)| *weight))
            .map_err(|err| anyhow::anyhow!("invalid operation weights: {err}"))?;
        Ok(Self { entries, dist })
    }

    pub fn sample(&self, rng: &mut impl Rng) -> OpKind {
        self.entries[self.dist.sample(rng)].1
    }

    /// Normalized probability of `kind`; zero when it is not in the table.
    pub fn probability(&self, kind: OpKind) -> f64 {
        let sum = self.entries.iter().map(|(weight, _)| weight).sum::<f64>();
        self.entries
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(weight, _)| weight / sum)
            .unwrap_or(0.0)
    }

    pub fn entries(&self) -> &[(f64, OpKind)] {
        &self.entries
    }
}

/// Immutable state shared by every worker of a run.
#[derive(Clone, Debug)]
pub struct Workload {
    pub maps: MapRegistry,
    pub keys: KeyDomain,
    pub values: ValuePool,
    pub table: DispatchTable,
    pub map_selection: MapSelection,
}

impl Workload {
    fn select_map(&self, ctx: &mut WorkerContext) -> &MapHandle {
        let index = match self.map_selection {
            MapSelection::Random => ctx.random_index(self.maps.len()),
            MapSelection::RoundRobin => ctx.next_map_index(self.maps.len()),
        };
        self.maps.get(index)
    }
}

/// Private state of one worker; never shared.
#[derive(Debug)]
pub struct WorkerContext {
    id: usize,
    rng: SmallRng,
    counter: OperationCounter,
    cursor: usize,
}

impl WorkerContext {
    /// The round-robin cursor starts at `id`, so workers begin on different
    /// maps instead of all hitting the first one together.
    pub fn new(id: usize, base_seed: u64) -> Self {
        Self {
            id,
            rng: rng::seeded(rng::worker_seed(base_seed, id)),
            counter: OperationCounter::default(),
            cursor: id,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn counter(&self) -> &OperationCounter {
        &self.counter
    }

    pub fn random_index(&mut self, bound: usize) -> usize {
        rng::random_index(&mut self.rng, bound)
    }

    /// Next map index of the private cursor; visits every map once per
    /// `maps` calls, in order, wrapping at the end.
    pub fn next_map_index(&mut self, maps: usize) -> usize {
        let index = self.cursor % maps;
        self.cursor = index + 1;
        index
    }

    fn random_value(&mut self, values: &ValuePool) -> Bytes {
        values.pick(&mut self.rng)
    }
}

/// Issue one operation. The counter is only updated after the call returns.
pub async fn step(workload: &Workload, ctx: &mut WorkerContext) -> anyhow::Result<OpKind> {
    let kind = workload.table.sample(&mut ctx.rng);
    let handle = workload.select_map(ctx);
    let key = workload.keys.key(ctx.random_index(workload.keys.len()));
    let map = handle.map();

    match kind {
        OpKind::Get => {
            map.get(&key).await?;
        }
        OpKind::Put => {
            let value = ctx.random_value(&workload.values);
            map.put(key, value).await?;
        }
        OpKind::PutIfAbsent => {
            let value = ctx.random_value(&workload.values);
            map.put_if_absent(key, value).await?;
        }
        OpKind::Set => {
            let value = ctx.random_value(&workload.values);
            map.set(key, value).await?;
        }
        // Only the first remove/delete of a key finds a value; later calls
        // time the empty path.
        OpKind::Remove => {
            map.remove(&key).await?;
        }
        OpKind::Delete => {
            map.delete(&key).await?;
        }
        OpKind::Cas => {
            // Another worker may change the key between the read and the CAS;
            // the CAS then fails and is still counted as an attempt.
            let Some(expected) = map.get(&key).await? else {
                return Ok(kind);
            };
            let value = ctx.random_value(&workload.values);
            map.compare_and_set(&key, &expected, value).await?;
        }
        OpKind::SetThenDelete => {
            let value = ctx.random_value(&workload.values);
            map.set(key.clone(), value).await?;
            map.delete(&key).await?;
        }
    }
    ctx.counter.record(kind);
    Ok(kind)
}

/// What a worker hands back to the orchestrator when its loop ends.
#[derive(Debug)]
pub struct WorkerResult {
    pub worker: usize,
    pub counter: OperationCounter,
    pub iterations: u64,
    pub elapsed: Duration,
    /// The error that stopped the loop early, if any.
    pub error: Option<anyhow::Error>,
}

/// Wall-clock end of a duration budget. A duration too large to represent
/// never expires.
fn deadline(start: Instant, budget: RunBudget) -> Option<Instant> {
    match budget {
        RunBudget::Duration(duration) => start.checked_add(duration),
        RunBudget::Iterations(_) => None,
    }
}

/// Run `ctx` against `workload` until `budget` is spent or a call fails.
pub async fn run_worker(
    workload: Arc<Workload>,
    mut ctx: WorkerContext,
    budget: RunBudget,
) -> WorkerResult {
    let start = Instant::now();
    let deadline = deadline(start, budget);
    let limit = match budget {
        RunBudget::Iterations(iterations) => iterations,
        RunBudget::Duration(_) => u64::MAX,
    };

    let mut iterations = 0u64;
    let mut error = None;
    while iterations < limit {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        if let Err(err) = step(&workload, &mut ctx).await {
            tracing::warn!(
                worker = ctx.id,
                iteration = iterations,
                error = %format!("{err:#}"),
                "worker stopped"
            );
            error = Some(err);
            break;
        }
        iterations += 1;
        if iterations % YIELD_EVERY == 0 {
            // Keep the loop cooperative even when the store never suspends.
            tokio::task::yield_now().await;
        }
    }

    tracing::debug!(worker = ctx.id, iterations, counter = %ctx.counter, "worker finished");
    WorkerResult {
        worker: ctx.id,
        counter: ctx.counter,
        iterations,
        elapsed: start.elapsed(),
        error,
    }
}
