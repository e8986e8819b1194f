//! Lightweight per-operation call counters for a store backend.
//!
//! Counters are best-effort and relaxed; they exist so tests and operators can
//! see which remote calls were actually issued, independent of the harness's
//! own per-worker tallies.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of store call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub gets: u64,
    pub puts: u64,
    pub sets: u64,
    pub put_if_absents: u64,
    pub removes: u64,
    pub deletes: u64,
    pub cas_attempts: u64,
    pub cas_successes: u64,
}

impl StoreStatsSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.gets
            + self.puts
            + self.sets
            + self.put_if_absents
            + self.removes
            + self.deletes
            + self.cas_attempts
    }
}

/// Tracks store calls by operation kind.
#[derive(Debug, Default)]
pub struct StoreStats {
    gets: AtomicU64,
    puts: AtomicU64,
    sets: AtomicU64,
    put_if_absents: AtomicU64,
    removes: AtomicU64,
    deletes: AtomicU64,
    cas_attempts: AtomicU64,
    cas_successes: AtomicU64,
}

impl StoreStats {
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put_if_absent(&self) {
        self.put_if_absents.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cas(&self, succeeded: bool) {
        self.cas_attempts.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.cas_successes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            put_if_absents: self.put_if_absents.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            cas_attempts: self.cas_attempts.load(Ordering::Relaxed),
            cas_successes: self.cas_successes.load(Ordering::Relaxed),
        }
    }
}
