//! Bulk preload of the key domain.
//!
//! The key domain is split into `threads` contiguous batches and one task is
//! submitted per (map, batch) pair; a semaphore keeps at most `threads` tasks
//! loading at once. The whole phase is bounded by a single timeout. Loading is
//! best-effort: on timeout or interruption the outstanding tasks are aborted
//! and the run carries on with whatever was loaded.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::dataset::KeyDomain;
use crate::registry::{MapHandle, MapRegistry};

/// Each batch task logs its progress after this many keys.
const PROGRESS_EVERY: usize = 10_000;

/// How the preload phase ended.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreloadStatus {
    Completed,
    TimedOut,
    Interrupted,
}

/// Summary of a preload phase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PreloadOutcome {
    pub status: PreloadStatus,
    pub tasks_submitted: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    /// Keys written by tasks that ran to completion.
    pub keys_loaded: u64,
    pub elapsed_ms: u64,
}

/// Split `[0, keys)` into at most `threads` contiguous batches of
/// `ceil(keys / threads)` keys; empty batches are dropped.
pub fn batches(keys: usize, threads: usize) -> Vec<Range<usize>> {
    let threads = threads.max(1);
    let batch_size = keys.div_ceil(threads);
    (0..threads)
        .map(|t| {
            let start = (t * batch_size).min(keys);
            let end = (start + batch_size).min(keys);
            start..end
        })
        .filter(|range| !range.is_empty())
        .collect()
}

/// Bounded-concurrency loader that `set`s one value into every key of every map.
#[derive(Clone, Debug)]
pub struct BulkLoader {
    threads: usize,
    timeout: Duration,
}

impl BulkLoader {
    pub fn new(threads: usize, timeout: Duration) -> Self {
        Self {
            threads: threads.max(1),
            timeout,
        }
    }

    pub async fn preload(
        &self,
        maps: &MapRegistry,
        keys: &KeyDomain,
        value: Bytes,
    ) -> PreloadOutcome {
        self.preload_with_shutdown(maps, keys, value, std::future::pending())
            .await
    }

    /// Like [`BulkLoader::preload`], but stops early when `shutdown` resolves.
    pub async fn preload_with_shutdown<F>(
        &self,
        maps: &MapRegistry,
        keys: &KeyDomain,
        value: Bytes,
        shutdown: F,
    ) -> PreloadOutcome
    where
        F: Future<Output = ()> + Send,
    {
        let start = Instant::now();
        let permits = Arc::new(Semaphore::new(self.threads));
        let mut tasks = JoinSet::new();

        for handle in maps.iter() {
            for range in batches(keys.len(), self.threads) {
                let handle = handle.clone();
                let keys = keys.clone();
                let value = value.clone();
                let permits = permits.clone();
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await?;
                    load_batch(&handle, &keys, range, value).await
                });
            }
        }
        let tasks_submitted = tasks.len();
        tracing::info!(
            maps = maps.len(),
            keys = keys.len(),
            tasks = tasks_submitted,
            threads = self.threads,
            "preloading key domain"
        );

        let mut tasks_completed = 0usize;
        let mut tasks_failed = 0usize;
        let mut keys_loaded = 0u64;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        let status = loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break PreloadStatus::Completed,
                    Some(Ok(Ok(loaded))) => {
                        tasks_completed += 1;
                        keys_loaded += loaded as u64;
                    }
                    Some(Ok(Err(err))) => {
                        tasks_failed += 1;
                        tracing::warn!(error = %format!("{err:#}"), "preload batch failed");
                    }
                    Some(Err(err)) => {
                        tasks_failed += 1;
                        tracing::error!(error = ?err, "preload batch panicked");
                    }
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        timeout = ?self.timeout,
                        outstanding = tasks.len(),
                        "timeout waiting for preload tasks to finish"
                    );
                    break PreloadStatus::TimedOut;
                }
                _ = &mut shutdown => {
                    tracing::error!(outstanding = tasks.len(), "preload interrupted");
                    break PreloadStatus::Interrupted;
                }
            }
        };
        // Abort whatever is still queued or running and wait for it to stop.
        tasks.shutdown().await;

        let outcome = PreloadOutcome {
            status,
            tasks_submitted,
            tasks_completed,
            tasks_failed,
            keys_loaded,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(?outcome, "preload finished");
        outcome
    }
}

async fn load_batch(
    handle: &MapHandle,
    keys: &KeyDomain,
    range: Range<usize>,
    value: Bytes,
) -> anyhow::Result<usize> {
    let mut loaded = 0usize;
    for index in range {
        handle
            .map()
            .set(keys.key(index), value.clone())
            .await
            .map_err(|err| err.context(format!("preload {} key {index}", handle.name())))?;
        loaded += 1;
        if loaded % PROGRESS_EVERY == 0 {
            tracing::debug!(map = handle.name(), loaded, "preloaded keys in this batch");
        }
    }
    Ok(loaded)
}
