//! Placement of maps onto consensus groups.
//!
//! Groups are named synthetically and maps are dealt out round-robin, so the
//! distribution is uniform when `maps` is a multiple of the group count and
//! off by at most one map per group otherwise.

use serde::{Deserialize, Serialize};

use cp_store::DEFAULT_GROUP;

/// Ordered list of the consensus groups that host the maps of a run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GroupSet {
    names: Vec<String>,
}

impl GroupSet {
    /// `cp_groups == 0` places everything in the implicit default group;
    /// otherwise groups are `cpgroup-0 .. cpgroup-{n-1}`.
    pub fn compute(cp_groups: usize) -> Self {
        if cp_groups == 0 {
            return Self {
                names: vec![DEFAULT_GROUP.to_string()],
            };
        }
        let names = (0..cp_groups).map(|i| format!("cpgroup-{i}")).collect();
        Self { names }
    }

    /// Group hosting the map with index `map_index`.
    pub fn assign(&self, map_index: usize) -> &str {
        &self.names[map_index % self.names.len()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_groups_means_default_group() {
        let groups = GroupSet::compute(0);
        assert_eq!(groups.names(), ["default".to_string()]);
        for i in 0..10 {
            assert_eq!(groups.assign(i), "default");
        }
    }

    #[test]
    fn groups_are_named_sequentially() {
        let groups = GroupSet::compute(3);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.names(), ["cpgroup-0", "cpgroup-1", "cpgroup-2"]);
    }

    #[test]
    fn maps_are_assigned_round_robin() {
        let groups = GroupSet::compute(2);
        let assigned = (0..5).map(|i| groups.assign(i)).collect::<Vec<_>>();
        assert_eq!(
            assigned,
            ["cpgroup-0", "cpgroup-1", "cpgroup-0", "cpgroup-1", "cpgroup-0"]
        );
    }

    #[test]
    fn uneven_distribution_is_off_by_at_most_one() {
        for cp_groups in 1..6 {
            for maps in 0..20 {
                let groups = GroupSet::compute(cp_groups);
                let mut per_group = vec![0usize; cp_groups];
                for i in 0..maps {
                    let idx = groups
                        .names()
                        .iter()
                        .position(|g| g == groups.assign(i))
                        .expect("assigned group exists");
                    per_group[idx] += 1;
                }
                let max = per_group.iter().max().copied().unwrap_or(0);
                let min = per_group.iter().min().copied().unwrap_or(0);
                assert!(max - min <= 1, "maps={maps} cp_groups={cp_groups}");
                if maps % cp_groups == 0 {
                    assert_eq!(max, min);
                }
            }
        }
    }
}
