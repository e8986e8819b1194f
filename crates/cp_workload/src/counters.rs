//! Per-worker operation tallies and their run-level aggregate.
//!
//! A counter is owned by exactly one worker while the run is in progress and
//! handed back to the orchestrator when the worker finishes, so no field is
//! ever mutated concurrently.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dispatch::OpKind;

/// Number of operations issued, by kind. Attempts are counted, not successes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationCounter {
    pub get: u64,
    pub put: u64,
    pub put_if_absent: u64,
    pub set: u64,
    pub remove: u64,
    pub delete: u64,
    pub cas: u64,
    pub set_then_delete: u64,
}

impl OperationCounter {
    pub fn record(&mut self, kind: OpKind) {
        *self.field_mut(kind) += 1;
    }

    pub fn count(&self, kind: OpKind) -> u64 {
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

    /// Field-by-field sum.
    pub fn add(&mut self, other: &OperationCounter) {
        for kind in OpKind::ALL {
            *self.field_mut(kind) += other.count(kind);
        }
    }

    pub fn total(&self) -> u64 {
        OpKind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }

    fn field_mut(&mut self, kind: OpKind) -> &mut u64 {
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
}

impl fmt::Display for OperationCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperationCounter{")?;
        for (i, kind) in OpKind::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", kind.as_str(), self.count(*kind))?;
        }
        f.write_str("}")
    }
}

/// Sum of every worker's counter, for reporting only.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterAggregate {
    pub total: OperationCounter,
    pub workers: usize,
}

impl CounterAggregate {
    pub fn fold<'a>(counters: impl IntoIterator<Item = &'a OperationCounter>) -> Self {
        counters
            .into_iter()
            .fold(Self::default(), |mut acc, counter| {
                acc.total.add(counter);
                acc.workers += 1;
                acc
            })
    }
}

impl fmt::Display for CounterAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} worker threads", self.total, self.workers)
    }
}
