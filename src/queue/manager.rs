use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::{Entry, OccupiedEntry};
use dashmap::DashMap;

use super::context::WaitContext;
use super::error::{BrokerError, BrokerResult};
use super::message_queue::{Claim, Delivery, MessageQueue, Waiter};
use super::stats::{BrokerStats, StatsSnapshot};
use crate::config::BrokerConfig;

/// Owns every named queue.
///
/// Queues are created lazily by the first put or get against a name and
/// removed as soon as they hold neither messages nor waiters. Every
/// transition that can create or empty a queue runs under the map
/// entry's exclusive lock, so a queue is never revived while it is being
/// torn down and the active count is adjusted exactly once per queue.
///
/// One path ignores `max_queues`: when a get future is dropped after a
/// message was already handed to it, the message is put back and its
/// queue re-created even if that takes the active count past the limit.
pub struct QueueManager<T> {
    queues: DashMap<String, Arc<MessageQueue<T>>>,
    active: AtomicUsize,
    max_queues: usize,
    max_messages: usize,
    stats: BrokerStats,
}

impl<T> QueueManager<T> {
    /// Zero for either limit means unlimited.
    pub fn new(max_queues: usize, max_messages: usize) -> Self {
        Self {
            queues: DashMap::new(),
            active: AtomicUsize::new(0),
            max_queues,
            max_messages,
            stats: BrokerStats::new(),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.max_queues, config.max_messages)
    }

    pub fn max_queues(&self) -> usize {
        self.max_queues
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Deposits a message into `name`, creating the queue if needed.
    pub fn put(&self, name: &str, message: T) -> BrokerResult<Delivery> {
        let result = match self.queues.entry(name.to_owned()) {
            Entry::Occupied(entry) => {
                let result = entry.get().put(message);
                // Handing off to the last waiter leaves the queue idle.
                if entry.get().is_idle() {
                    self.remove_entry(entry);
                }
                result
            }
            Entry::Vacant(entry) => {
                self.reserve()?;
                let queue = Arc::new(MessageQueue::new(name, self.max_messages));
                match queue.put(message) {
                    Ok(delivery) => {
                        entry.insert(queue);
                        self.stats.record_created();
                        tracing::debug!(queue = name, "queue created");
                        Ok(delivery)
                    }
                    Err(e) => {
                        self.active.fetch_sub(1, Ordering::AcqRel);
                        Err(e)
                    }
                }
            }
        };

        match &result {
            Ok(Delivery::HandedOff) => self.stats.record_handed_off(),
            Ok(Delivery::Buffered) => self.stats.record_buffered(),
            Err(e) => {
                self.stats.record_message_limit();
                tracing::warn!(queue = name, "put rejected: {}", e);
            }
        }
        result
    }

    /// Takes the oldest message from `name`, waiting for one if the
    /// queue is empty or does not exist yet.
    ///
    /// A missing queue is created on the spot with this caller as its
    /// first waiter, so a put from anyone else finds it and hands off
    /// directly.
    pub async fn get(&self, name: &str, ctx: &WaitContext) -> BrokerResult<T> {
        let waiter = match self.queues.entry(name.to_owned()) {
            Entry::Occupied(entry) => {
                let claim = entry.get().claim();
                match claim {
                    Claim::Ready(message) => {
                        if entry.get().is_idle() {
                            self.remove_entry(entry);
                        }
                        self.stats.record_dequeued();
                        return Ok(message);
                    }
                    Claim::Waiting(waiter) => waiter,
                }
            }
            Entry::Vacant(entry) => {
                self.reserve()?;
                let queue = Arc::new(MessageQueue::new(name, self.max_messages));
                let waiter = queue.subscribe();
                entry.insert(queue);
                self.stats.record_created();
                tracing::debug!(queue = name, "queue created by waiting consumer");
                waiter
            }
        };

        let mut lease = Lease {
            manager: self,
            name,
            waiter: Some(waiter),
        };
        lease.wait(ctx).await
    }

    /// Takes the oldest message without waiting. Never creates a queue.
    pub fn try_get(&self, name: &str) -> Option<T> {
        let Entry::Occupied(entry) = self.queues.entry(name.to_owned()) else {
            return None;
        };
        let message = entry.get().try_take()?;
        if entry.get().is_idle() {
            self.remove_entry(entry);
        }
        self.stats.record_dequeued();
        Some(message)
    }

    /// Number of queues counted against the queue limit.
    pub fn queue_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Buffered messages in `name`; zero for unknown names.
    pub fn queue_len(&self, name: &str) -> usize {
        self.queues.get(name).map(|q| q.len()).unwrap_or(0)
    }

    /// Waiting consumers on `name`; zero for unknown names.
    pub fn waiting(&self, name: &str) -> usize {
        self.queues.get(name).map(|q| q.waiting()).unwrap_or(0)
    }

    pub fn list_queues(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue_count())
    }

    /// Claims one unit of the queue limit.
    fn reserve(&self) -> BrokerResult<()> {
        let max_queues = self.max_queues;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (max_queues == 0 || active < max_queues).then_some(active + 1)
            })
            .map(|_| ())
            .map_err(|_| {
                self.stats.record_queue_limit();
                tracing::warn!(max_queues, "queue limit reached");
                BrokerError::QueueLimitExceeded { max_queues }
            })
    }

    fn remove_entry(&self, entry: OccupiedEntry<'_, String, Arc<MessageQueue<T>>>) {
        let (name, _) = entry.remove_entry();
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.stats.record_removed();
        tracing::debug!(queue = %name, "idle queue removed");
    }

    /// Drops `queue` from the map if it is still the registered instance
    /// for `name` and has gone idle.
    fn release(&self, name: &str, queue: &Arc<MessageQueue<T>>) {
        let removed = self
            .queues
            .remove_if(name, |_, current| Arc::ptr_eq(current, queue) && current.is_idle());
        if removed.is_some() {
            self.active.fetch_sub(1, Ordering::AcqRel);
            self.stats.record_removed();
            tracing::debug!(queue = name, "idle queue removed");
        }
    }

    /// Puts back a message that was handed to a consumer who stopped
    /// listening. The message was accepted once, so neither limit
    /// applies.
    fn restore(&self, name: &str, message: T) {
        tracing::warn!(queue = name, "restoring message from abandoned waiter");
        match self.queues.entry(name.to_owned()) {
            Entry::Occupied(entry) => {
                entry.get().restore(message);
                if entry.get().is_idle() {
                    self.remove_entry(entry);
                }
            }
            Entry::Vacant(entry) => {
                let queue = Arc::new(MessageQueue::new(name, self.max_messages));
                queue.restore(message);
                entry.insert(queue);
                self.active.fetch_add(1, Ordering::AcqRel);
                self.stats.record_created();
            }
        }
    }
}

/// A get suspended on a queue. Whatever way the wait ends, including the
/// future being dropped, the waiter is settled first and the queue is
/// then released if that left it idle.
struct Lease<'a, T> {
    manager: &'a QueueManager<T>,
    name: &'a str,
    waiter: Option<Waiter<T>>,
}

impl<T> Lease<'_, T> {
    async fn wait(&mut self, ctx: &WaitContext) -> BrokerResult<T> {
        let Some(waiter) = self.waiter.as_mut() else {
            return Err(BrokerError::Canceled);
        };

        let result = waiter.wait(ctx).await;
        match &result {
            Ok(_) => self.manager.stats.record_dequeued(),
            Err(BrokerError::Canceled) => self.manager.stats.record_canceled(),
            Err(BrokerError::DeadlineExceeded) => self.manager.stats.record_timed_out(),
            Err(_) => {}
        }
        result
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        let Some(mut waiter) = self.waiter.take() else {
            return;
        };
        let queue = Arc::clone(waiter.queue());
        let stray = waiter.abandon();
        drop(waiter);

        if let Some(message) = stray {
            self.manager.restore(self.name, message);
        }
        self.manager.release(self.name, &queue);
    }
}
