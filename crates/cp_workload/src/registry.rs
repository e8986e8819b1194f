//! Named map handles for a run.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;

use cp_store::{CpMap, CpSubsystem};

use crate::groups::GroupSet;

/// Name of the map with index `index` hosted by `group`.
pub fn map_name(index: usize, group: &str) -> String {
    format!("map{index}@{group}")
}

/// One logical map instance and the proxy used to reach it.
#[derive(Clone)]
pub struct MapHandle {
    index: usize,
    group: String,
    name: String,
    map: Arc<dyn CpMap>,
}

impl MapHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map(&self) -> &dyn CpMap {
        self.map.as_ref()
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapHandle")
            .field("index", &self.index)
            .field("group", &self.group)
            .field("name", &self.name)
            .finish()
    }
}

/// Every map handle of a run, in index order.
#[derive(Clone, Debug)]
pub struct MapRegistry {
    handles: Arc<[MapHandle]>,
}

impl MapRegistry {
    /// Acquire a proxy for each of `maps` maps, placing map `i` in
    /// `groups.assign(i)`. Any store error aborts construction.
    pub fn build(store: &dyn CpSubsystem, maps: usize, groups: &GroupSet) -> anyhow::Result<Self> {
        let mut handles = Vec::with_capacity(maps);
        for index in 0..maps {
            let group = groups.assign(index);
            let name = map_name(index, group);
            tracing::debug!(map = %name, "creating CP map proxy");
            let map = store
                .get_map(&name)
                .with_context(|| format!("acquire CP map {name}"))?;
            handles.push(MapHandle {
                index,
                group: group.to_string(),
                name,
                map,
            });
        }
        Ok(Self {
            handles: handles.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, index: usize) -> &MapHandle {
        &self.handles[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapHandle> {
        self.handles.iter()
    }
}
