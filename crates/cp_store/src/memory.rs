//! In-process CP subsystem.
//!
//! Maps are grouped by their consensus group; each group owns one mutex over
//! all of its maps, so operations on the same key are totally ordered and
//! operations on different groups never contend. Groups and maps are created
//! on the first operation that touches them, never by proxy acquisition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;

use crate::stats::{StoreStats, StoreStatsSnapshot};
use crate::{split_group_name, CpMap, CpSubsystem, MapKey};

type Entries = HashMap<MapKey, Bytes>;

#[derive(Default)]
struct GroupState {
    maps: Mutex<HashMap<String, Entries>>,
}

struct Inner {
    groups: RwLock<HashMap<String, Arc<GroupState>>>,
    available: AtomicBool,
    latency: Duration,
    stats: StoreStats,
}

impl Inner {
    fn ensure_available(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.available.load(Ordering::Acquire),
            "CP subsystem unavailable"
        );
        Ok(())
    }

    fn group(&self, name: &str) -> anyhow::Result<Arc<GroupState>> {
        {
            let guard = self
                .groups
                .read()
                .map_err(|_| anyhow!("group table lock poisoned"))?;
            if let Some(group) = guard.get(name) {
                return Ok(group.clone());
            }
        }
        let mut guard = self
            .groups
            .write()
            .map_err(|_| anyhow!("group table lock poisoned"))?;
        Ok(guard.entry(name.to_string()).or_default().clone())
    }
}

/// CP subsystem kept entirely in memory.
#[derive(Clone)]
pub struct MemoryCpSubsystem {
    inner: Arc<Inner>,
}

impl Default for MemoryCpSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCpSubsystem {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Every map operation sleeps for `latency` before it executes, which
    /// approximates a replicated round-trip.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                groups: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
                latency,
                stats: StoreStats::default(),
            }),
        }
    }

    /// Toggle reachability. While unavailable, proxy acquisition and every
    /// map operation fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
        tracing::debug!(available, "memory CP subsystem availability changed");
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Names of all groups that have been touched by an operation.
    pub fn group_names(&self) -> Vec<String> {
        let mut names = match self.inner.groups.read() {
            Ok(guard) => guard.keys().cloned().collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Object names of the maps materialized in `group`.
    pub fn map_names(&self, group: &str) -> Vec<String> {
        let Ok(guard) = self.inner.groups.read() else {
            return Vec::new();
        };
        let Some(state) = guard.get(group) else {
            return Vec::new();
        };
        let mut names = match state.maps.lock() {
            Ok(maps) => maps.keys().cloned().collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Number of entries in the map called `name`; zero when it was never
    /// materialized. Bypasses availability and call accounting.
    pub fn entry_count(&self, name: &str) -> anyhow::Result<usize> {
        let (object, group) = split_group_name(name)?;
        let guard = self
            .inner
            .groups
            .read()
            .map_err(|_| anyhow!("group table lock poisoned"))?;
        let Some(state) = guard.get(group) else {
            return Ok(0);
        };
        let maps = state
            .maps
            .lock()
            .map_err(|_| anyhow!("group {group} lock poisoned"))?;
        Ok(maps.get(object).map(|entries| entries.len()).unwrap_or(0))
    }
}

impl CpSubsystem for MemoryCpSubsystem {
    fn get_map(&self, name: &str) -> anyhow::Result<Arc<dyn CpMap>> {
        self.inner.ensure_available()?;
        let (object, group) = split_group_name(name)?;
        Ok(Arc::new(MemoryCpMap {
            name: name.to_string(),
            object: object.to_string(),
            group: group.to_string(),
            inner: self.inner.clone(),
        }))
    }
}

/// Proxy for one map of a [`MemoryCpSubsystem`].
struct MemoryCpMap {
    name: String,
    object: String,
    group: String,
    inner: Arc<Inner>,
}

impl MemoryCpMap {
    /// Simulate the round-trip, then run `f` under the owning group's lock.
    async fn apply<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> anyhow::Result<T> {
        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        self.inner
            .ensure_available()
            .map_err(|err| err.context(format!("CP group {} unreachable", self.group)))?;
        let group = self.inner.group(&self.group)?;
        let mut maps = group
            .maps
            .lock()
            .map_err(|_| anyhow!("group {} lock poisoned", self.group))?;
        if !maps.contains_key(&self.object) {
            maps.insert(self.object.clone(), Entries::new());
        }
        let entries = maps
            .get_mut(&self.object)
            .ok_or_else(|| anyhow!("map {} vanished", self.name))?;
        Ok(f(entries))
    }
}

#[async_trait]
impl CpMap for MemoryCpMap {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &MapKey) -> anyhow::Result<Option<Bytes>> {
        let value = self.apply(|entries| entries.get(key).cloned()).await?;
        self.inner.stats.record_get();
        Ok(value)
    }

    async fn put(&self, key: MapKey, value: Bytes) -> anyhow::Result<Option<Bytes>> {
        let prior = self.apply(|entries| entries.insert(key, value)).await?;
        self.inner.stats.record_put();
        Ok(prior)
    }

    async fn set(&self, key: MapKey, value: Bytes) -> anyhow::Result<()> {
        self.apply(|entries| {
            entries.insert(key, value);
        })
        .await?;
        self.inner.stats.record_set();
        Ok(())
    }

    async fn put_if_absent(&self, key: MapKey, value: Bytes) -> anyhow::Result<bool> {
        let stored = self
            .apply(|entries| {
                if entries.contains_key(&key) {
                    false
                } else {
                    entries.insert(key, value);
                    true
                }
            })
            .await?;
        self.inner.stats.record_put_if_absent();
        Ok(stored)
    }

    async fn remove(&self, key: &MapKey) -> anyhow::Result<Option<Bytes>> {
        let prior = self.apply(|entries| entries.remove(key)).await?;
        self.inner.stats.record_remove();
        Ok(prior)
    }

    async fn delete(&self, key: &MapKey) -> anyhow::Result<()> {
        self.apply(|entries| {
            entries.remove(key);
        })
        .await?;
        self.inner.stats.record_delete();
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &MapKey,
        expected: &Bytes,
        new_value: Bytes,
    ) -> anyhow::Result<bool> {
        let swapped = self
            .apply(|entries| match entries.get_mut(key) {
                Some(current) if current == expected => {
                    *current = new_value;
                    true
                }
                _ => false,
            })
            .await?;
        self.inner.stats.record_cas(swapped);
        Ok(swapped)
    }
}
