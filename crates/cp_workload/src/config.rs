//! Run configuration for the CP map workload.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::OpKind;

/// Default ceiling for the bulk preload phase.
pub const DEFAULT_PRELOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Shape of the key domain `[0, keys)`.
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// Keys are the integers themselves.
    #[default]
    Int,
    /// Keys are fixed-width `PREFIX_{index}{digits}` strings.
    Prefixed,
}

/// How each worker picks the map for its next operation.
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MapSelection {
    /// Uniformly random over all maps.
    #[default]
    Random,
    /// Each worker walks the map list with a private cursor.
    RoundRobin,
}

/// How long every worker keeps issuing operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunBudget {
    Duration(Duration),
    /// Operations per worker.
    Iterations(u64),
}

/// Relative probability of each operation. Weights do not need to sum to 1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct OperationWeights {
    pub get: f64,
    pub put: f64,
    pub put_if_absent: f64,
    pub set: f64,
    pub remove: f64,
    pub delete: f64,
    pub cas: f64,
    pub set_then_delete: f64,
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            get: 0.0,
            put: 0.0,
            put_if_absent: 0.0,
            set: 1.0,
            remove: 0.0,
            delete: 0.0,
            cas: 0.0,
            set_then_delete: 0.0,
        }
    }
}

impl OperationWeights {
    /// A mix where only `kind` is ever chosen.
    pub fn only(kind: OpKind) -> Self {
        let mut weights = Self {
            set: 0.0,
            ..Self::default()
        };
        *weights.weight_mut(kind) = 1.0;
        weights
    }

    pub fn weight(&self, kind: OpKind) -> f64 {
        match kind {
            OpKind::Get => self.get,
            OpKind::Put => self.put,
            OpKind::PutIfAbsent => self.put_if_absent,
            OpKind::Set => self.set,
            OpKind::Remove => self.remove,
            OpKind::Delete => self.delete,
            OpKind::Cas => self.cas,
            OpKind::SetThenDelete => self.set_then_delete,
        }
    }

    pub fn weight_mut(&mut self, kind: OpKind) -> &mut f64 {
        match kind {
            OpKind::Get => &mut self.get,
            OpKind::Put => &mut self.put,
            OpKind::PutIfAbsent => &mut self.put_if_absent,
            OpKind::Set => &mut self.set,
            OpKind::Remove => &mut self.remove,
            OpKind::Delete => &mut self.delete,
            OpKind::Cas => &mut self.cas,
            OpKind::SetThenDelete => &mut self.set_then_delete,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut positive = false;
        for kind in OpKind::ALL {
            let weight = self.weight(kind);
            anyhow::ensure!(
                weight.is_finite() && weight >= 0.0,
                "weight for {} must be a finite, non-negative number (got {weight})",
                kind.as_str()
            );
            positive |= weight > 0.0;
        }
        anyhow::ensure!(positive, "at least one operation weight must be > 0");
        Ok(())
    }
}

/// Full configuration of a benchmark run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Prefix for report log lines.
    pub name: String,
    /// Consensus groups hosting the maps; 0 means the single default group.
    pub cp_groups: usize,
    pub maps: usize,
    /// Size of the per-map key domain `[0, keys)`.
    pub keys: usize,
    pub values_count: usize,
    pub value_size_bytes: usize,
    /// Only used in [`KeyMode::Prefixed`]; keys are `key_size_bytes / 2` characters.
    pub key_size_bytes: usize,
    pub key_mode: KeyMode,
    pub map_selection: MapSelection,
    /// Run the bulk loader before the workload phase.
    pub fill_on_prepare: bool,
    /// Number of concurrent workload workers.
    pub threads: usize,
    pub seed: u64,
    pub duration: Duration,
    /// Operations per worker; overrides `duration` when set.
    pub iterations: Option<u64>,
    pub preload_timeout: Duration,
    pub preload_threads: usize,
    /// Pause after setup so the CP subsystem can settle.
    pub stabilize: Duration,
    /// Fail the run when any worker stops with an error.
    pub fail_fast: bool,
    pub weights: OperationWeights,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            name: "CpMapTest".to_string(),
            cp_groups: 0,
            maps: 1,
            keys: 1,
            values_count: 100,
            value_size_bytes: 100,
            key_size_bytes: 100,
            key_mode: KeyMode::Int,
            map_selection: MapSelection::Random,
            fill_on_prepare: true,
            threads: 10,
            seed: 0,
            duration: Duration::from_secs(30),
            iterations: None,
            preload_timeout: DEFAULT_PRELOAD_TIMEOUT,
            preload_threads: available_parallelism(),
            stabilize: Duration::ZERO,
            fail_fast: true,
            weights: OperationWeights::default(),
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.maps > 0, "maps must be > 0");
        anyhow::ensure!(self.keys > 0, "keys must be > 0");
        anyhow::ensure!(self.values_count > 0, "values_count must be > 0");
        anyhow::ensure!(self.threads > 0, "threads must be > 0");
        anyhow::ensure!(self.preload_threads > 0, "preload_threads must be > 0");
        anyhow::ensure!(
            self.iterations.is_some() || !self.duration.is_zero(),
            "either a non-zero duration or an iteration count is required"
        );
        self.weights.validate()
    }

    pub fn budget(&self) -> RunBudget {
        match self.iterations {
            Some(iterations) => RunBudget::Iterations(iterations),
            None => RunBudget::Duration(self.duration),
        }
    }
}

/// Number of threads the host can run in parallel, at least 1.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_single_set_only_map() {
        let config = WorkloadConfig::default();
        assert_eq!(config.cp_groups, 0);
        assert_eq!(config.maps, 1);
        assert_eq!(config.keys, 1);
        assert_eq!(config.values_count, 100);
        assert_eq!(config.value_size_bytes, 100);
        assert_eq!(config.key_size_bytes, 100);
        assert!(config.fill_on_prepare);
        assert_eq!(config.preload_timeout, Duration::from_secs(3600));
        assert_eq!(config.weights.set, 1.0);
        assert_eq!(config.weights.get, 0.0);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let mut config = WorkloadConfig {
            maps: 0,
            ..WorkloadConfig::default()
        };
        assert!(config.validate().is_err());

        config.maps = 1;
        config.weights = OperationWeights {
            set: 0.0,
            ..OperationWeights::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one"));

        config.weights.get = f64::NAN;
        assert!(config.validate().is_err());

        config.weights.get = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn iterations_override_duration() {
        let mut config = WorkloadConfig::default();
        assert_eq!(config.budget(), RunBudget::Duration(Duration::from_secs(30)));
        config.iterations = Some(5);
        assert_eq!(config.budget(), RunBudget::Iterations(5));
    }

    #[test]
    fn only_selects_a_single_operation() {
        let weights = OperationWeights::only(OpKind::Cas);
        for kind in OpKind::ALL {
            let expected = if kind == OpKind::Cas { 1.0 } else { 0.0 };
            assert_eq!(weights.weight(kind), expected, "{kind:?}");
        }
    }
}
