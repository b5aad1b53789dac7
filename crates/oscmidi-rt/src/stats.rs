//! Counters for the realtime drop paths.
//!
//! The realtime thread only increments; application threads read snapshots
//! and decide what to log.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct TransportStats {
    ingress_dropped: AtomicU64,
    egress_dropped: AtomicU64,
    filter_dropped: AtomicU64,
    late: AtomicU64,
    corrupt: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Incoming events lost because the ingress ring was full.
    pub ingress_dropped: u64,
    /// Outgoing events lost because the egress ring was full.
    pub egress_dropped: u64,
    /// Filter output lost because the port buffer was full.
    pub filter_dropped: u64,
    /// Outgoing events that missed their block and were sent at offset 0.
    pub late: u64,
    pub corrupt: u64,
}

impl StatsSnapshot {
    /// Total of every drop or degradation counter.
    pub fn total(&self) -> u64 {
        self.ingress_dropped + self.egress_dropped + self.filter_dropped + self.late + self.corrupt
    }

    /// Per-counter increase since `earlier`.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            ingress_dropped: self.ingress_dropped.saturating_sub(earlier.ingress_dropped),
            egress_dropped: self.egress_dropped.saturating_sub(earlier.egress_dropped),
            filter_dropped: self.filter_dropped.saturating_sub(earlier.filter_dropped),
            late: self.late.saturating_sub(earlier.late),
            corrupt: self.corrupt.saturating_sub(earlier.corrupt),
        }
    }
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_ingress_dropped(&self) {
        self.ingress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_filter_dropped(&self) {
        self.filter_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_late(&self) {
        self.late.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_corrupt(&self) {
        self.corrupt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ingress_dropped: self.ingress_dropped.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            filter_dropped: self.filter_dropped.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
        }
    }
}
