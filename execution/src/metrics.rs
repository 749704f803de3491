use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide counters. All updates are relaxed; readers take a [`EngineMetricsSnapshot`].
#[derive(Default)]
pub struct EngineMetrics {
    settlements_committed: AtomicU64,
    contention_retries: AtomicU64,
    storage_failures: AtomicU64,
    concurrent_settlement_lost: AtomicU64,
    sessions_started: AtomicU64,
    sessions_timed_out: AtomicU64,
    escrow_refunds: AtomicU64,
    escrow_stuck: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineMetricsSnapshot {
    pub settlements_committed: u64,
    pub contention_retries: u64,
    pub storage_failures: u64,
    pub concurrent_settlement_lost: u64,
    pub sessions_started: u64,
    pub sessions_timed_out: u64,
    pub escrow_refunds: u64,
    pub escrow_stuck: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            settlements_committed: self.settlements_committed.load(Ordering::Relaxed),
            contention_retries: self.contention_retries.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            concurrent_settlement_lost: self.concurrent_settlement_lost.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_timed_out: self.sessions_timed_out.load(Ordering::Relaxed),
            escrow_refunds: self.escrow_refunds.load(Ordering::Relaxed),
            escrow_stuck: self.escrow_stuck.load(Ordering::Relaxed),
        }
    }

    pub fn inc_settlements_committed(&self) {
        self.settlements_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_contention_retries(&self) {
        self.contention_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_storage_failures(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_concurrent_settlement_lost(&self) {
        self.concurrent_settlement_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_timed_out(&self) {
        self.sessions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_escrow_refunds(&self) {
        self.escrow_refunds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_escrow_stuck(&self) {
        self.escrow_stuck.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = EngineMetrics::default();
        metrics.inc_settlements_committed();
        metrics.inc_settlements_committed();
        metrics.inc_escrow_stuck();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.settlements_committed, 2);
        assert_eq!(snapshot.escrow_stuck, 1);
        assert_eq!(snapshot.contention_retries, 0);
    }
}
