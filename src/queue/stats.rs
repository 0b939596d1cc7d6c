use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Broker-wide operation counters. Queues come and go, so the counters
/// live on the manager rather than on individual queues.
#[derive(Debug, Default)]
pub struct BrokerStats {
    buffered_total: AtomicU64,
    handed_off_total: AtomicU64,
    dequeued_total: AtomicU64,
    queue_limit_rejections: AtomicU64,
    message_limit_rejections: AtomicU64,
    canceled_total: AtomicU64,
    timed_out_total: AtomicU64,
    queues_created: AtomicU64,
    queues_removed: AtomicU64,
}

/// Point-in-time copy of [`BrokerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub active_queues: usize,
    pub buffered_total: u64,
    pub handed_off_total: u64,
    pub dequeued_total: u64,
    pub queue_limit_rejections: u64,
    pub message_limit_rejections: u64,
    pub canceled_total: u64,
    pub timed_out_total: u64,
    pub queues_created: u64,
    pub queues_removed: u64,
}

impl StatsSnapshot {
    /// Messages accepted by a put, whether buffered or handed off.
    pub fn accepted_total(&self) -> u64 {
        self.buffered_total + self.handed_off_total
    }
}

impl BrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_buffered(&self) {
        self.buffered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handed_off(&self) {
        self.handed_off_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        self.dequeued_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_limit(&self) {
        self.queue_limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_limit(&self) {
        self.message_limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_canceled(&self) {
        self.canceled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timed_out(&self) {
        self.timed_out_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_created(&self) {
        self.queues_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self) {
        self.queues_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_queues: usize) -> StatsSnapshot {
        StatsSnapshot {
            active_queues,
            buffered_total: self.buffered_total.load(Ordering::Relaxed),
            handed_off_total: self.handed_off_total.load(Ordering::Relaxed),
            dequeued_total: self.dequeued_total.load(Ordering::Relaxed),
            queue_limit_rejections: self.queue_limit_rejections.load(Ordering::Relaxed),
            message_limit_rejections: self.message_limit_rejections.load(Ordering::Relaxed),
            canceled_total: self.canceled_total.load(Ordering::Relaxed),
            timed_out_total: self.timed_out_total.load(Ordering::Relaxed),
            queues_created: self.queues_created.load(Ordering::Relaxed),
            queues_removed: self.queues_removed.load(Ordering::Relaxed),
        }
    }
}
