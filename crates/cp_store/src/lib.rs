//! CP map store contract.
//!
//! The workload harness talks to a consensus-replicated key/value service
//! through the traits in this crate. Each named map is hosted by exactly one
//! consensus group; the group is encoded in the map name as `object@group`.
//! Concrete clients live elsewhere; `memory` provides an in-process backend
//! that keeps one lock per group so operations on a key are linearizable.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;
pub mod stats;

pub use memory::MemoryCpSubsystem;
pub use stats::{StoreStats, StoreStatsSnapshot};

/// Group that hosts objects whose name carries no `@group` suffix.
pub const DEFAULT_GROUP: &str = "default";

/// Key addressed inside a CP map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Int(u64),
    Str(Arc<str>),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(v) => write!(f, "{v}"),
            MapKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MapKey {
    fn from(value: u64) -> Self {
        MapKey::Int(value)
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::Str(Arc::from(value))
    }
}

/// A single named map hosted by one consensus group.
///
/// Every call is linearizable per key. An `Err` means the remote call did not
/// complete (group unavailable, timeout); it never encodes a lost CAS race.
#[async_trait]
pub trait CpMap: Send + Sync + 'static {
    /// Full object name, including the `@group` suffix when present.
    fn name(&self) -> &str;

    async fn get(&self, key: &MapKey) -> anyhow::Result<Option<Bytes>>;

    /// Store `value` and return the previous value, if any.
    async fn put(&self, key: MapKey, value: Bytes) -> anyhow::Result<Option<Bytes>>;

    /// Store `value` without returning the previous value.
    async fn set(&self, key: MapKey, value: Bytes) -> anyhow::Result<()>;

    /// Store `value` only when the key has no value; returns whether it was stored.
    async fn put_if_absent(&self, key: MapKey, value: Bytes) -> anyhow::Result<bool>;

    /// Remove the key and return its previous value, if any.
    async fn remove(&self, key: &MapKey) -> anyhow::Result<Option<Bytes>>;

    /// Remove the key without returning its previous value.
    async fn delete(&self, key: &MapKey) -> anyhow::Result<()>;

    /// Replace the value only when the current value equals `expected`.
    async fn compare_and_set(
        &self,
        key: &MapKey,
        expected: &Bytes,
        new_value: Bytes,
    ) -> anyhow::Result<bool>;
}

/// Entry point of the CP subsystem: hands out map proxies by name.
pub trait CpSubsystem: Send + Sync + 'static {
    /// Acquire a proxy for `name`. The map itself is created lazily on the
    /// first real operation, so this is cheap, but it still fails when the
    /// subsystem cannot be reached.
    fn get_map(&self, name: &str) -> anyhow::Result<Arc<dyn CpMap>>;
}

/// Split `object@group` into its object and group parts.
pub fn split_group_name(name: &str) -> anyhow::Result<(&str, &str)> {
    let (object, group) = match name.split_once('@') {
        Some((object, group)) => {
            anyhow::ensure!(
                !group.contains('@'),
                "object name {name:?} has more than one '@'"
            );
            (object, group)
        }
        None => (name, DEFAULT_GROUP),
    };
    anyhow::ensure!(!object.is_empty(), "object name {name:?} is empty");
    anyhow::ensure!(!group.is_empty(), "group name in {name:?} is empty");
    Ok((object, group))
}
