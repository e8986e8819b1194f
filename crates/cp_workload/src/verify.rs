//! Post-run occupancy check.
//!
//! The workload mixes writes with removes and deletes, so exact final counts
//! are meaningless; a map only fails when nothing in it survived.

use serde::{Deserialize, Serialize};

use crate::counters::CounterAggregate;
use crate::dataset::KeyDomain;
use crate::registry::MapRegistry;

/// Surviving entries of one map.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MapOccupancy {
    pub map: String,
    pub group: String,
    pub entries: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub maps: Vec<MapOccupancy>,
}

impl VerifyReport {
    pub fn empty_maps(&self) -> impl Iterator<Item = &MapOccupancy> {
        self.maps.iter().filter(|m| m.entries == 0)
    }

    pub fn passed(&self) -> bool {
        self.empty_maps().next().is_none()
    }

    /// Fail when any map ended up empty, naming every such map.
    pub fn check(&self, name: &str, aggregate: &CounterAggregate) -> anyhow::Result<()> {
        let empty = self.empty_maps().map(|m| m.map.as_str()).collect::<Vec<_>>();
        if !empty.is_empty() {
            anyhow::bail!(
                "{name}: CP maps [{}] don't contain any of the expected items ({aggregate})",
                empty.join(", ")
            );
        }
        Ok(())
    }
}

/// Read every key of every map and count the non-empty results.
pub async fn scan(
    name: &str,
    maps: &MapRegistry,
    keys: &KeyDomain,
) -> anyhow::Result<VerifyReport> {
    let mut report = VerifyReport::default();
    for handle in maps.iter() {
        let mut entries = 0usize;
        for index in 0..keys.len() {
            if handle.map().get(&keys.key(index)).await?.is_some() {
                entries += 1;
            }
        }
        tracing::info!(test = name, map = handle.name(), entries, "CP map entries count");
        report.maps.push(MapOccupancy {
            map: handle.name().to_string(),
            group: handle.group().to_string(),
            entries,
        });
    }
    Ok(report)
}
