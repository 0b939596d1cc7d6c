use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::context::WaitContext;
use super::error::{BrokerError, BrokerResult};

/// One named channel: a FIFO buffer of messages and a FIFO of consumers
/// waiting for one.
///
/// At most one of the two sequences is non-empty at any time. A put that
/// finds a waiter hands the message straight to it, and a get that finds
/// a buffered message takes it instead of waiting.
#[derive(Debug)]
pub struct MessageQueue<T> {
    name: String,
    max_messages: usize,
    state: Mutex<QueueState<T>>,
}

#[derive(Debug)]
struct QueueState<T> {
    buffer: VecDeque<T>,
    waiters: VecDeque<Slot<T>>,
    next_slot: u64,
}

/// Send side of a waiting consumer's single-use hand-off channel.
#[derive(Debug)]
struct Slot<T> {
    id: u64,
    tx: oneshot::Sender<T>,
}

/// How a successful put was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    HandedOff,
    Buffered,
}

/// Result of [`MessageQueue::claim`].
#[derive(Debug)]
pub enum Claim<T> {
    Ready(T),
    Waiting(Waiter<T>),
}

impl<T> QueueState<T> {
    /// Gives `message` to the oldest live waiter. Slots whose receiver
    /// is already gone are discarded on the way.
    fn hand_off(&mut self, mut message: T) -> Result<(), T> {
        while let Some(slot) = self.waiters.pop_front() {
            match slot.tx.send(message) {
                Ok(()) => return Ok(()),
                Err(returned) => message = returned,
            }
        }
        Err(message)
    }
}

impl<T> MessageQueue<T> {
    /// `max_messages` of zero leaves the buffer unbounded.
    pub fn new(name: impl Into<String>, max_messages: usize) -> Self {
        Self {
            name: name.into(),
            max_messages,
            state: Mutex::new(QueueState {
                buffer: VecDeque::new(),
                waiters: VecDeque::new(),
                next_slot: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    /// Number of registered waiters.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// No buffered messages and no waiters.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.buffer.is_empty() && state.waiters.is_empty()
    }

    pub fn put(&self, message: T) -> BrokerResult<Delivery> {
        let mut state = self.state.lock();

        let message = match state.hand_off(message) {
            Ok(()) => {
                tracing::debug!(queue = %self.name, "handed off to waiter");
                return Ok(Delivery::HandedOff);
            }
            Err(message) => message,
        };

        if self.max_messages > 0 && state.buffer.len() >= self.max_messages {
            return Err(BrokerError::MessageLimitExceeded {
                max_messages: self.max_messages,
            });
        }

        state.buffer.push_back(message);
        tracing::debug!(queue = %self.name, len = state.buffer.len(), "buffered");
        Ok(Delivery::Buffered)
    }

    /// Re-offers a message that was accepted once already. Goes to the
    /// oldest waiter, or else to the head of the buffer regardless of
    /// the message limit.
    pub fn restore(&self, message: T) {
        let mut state = self.state.lock();
        if let Err(message) = state.hand_off(message) {
            state.buffer.push_front(message);
        }
    }

    /// Removes the head message without waiting.
    pub fn try_take(&self) -> Option<T> {
        self.state.lock().buffer.pop_front()
    }

    /// Takes the head message, or registers a waiter if there is none.
    /// Both happen under one lock acquisition.
    pub fn claim(self: &Arc<Self>) -> Claim<T> {
        let mut state = self.state.lock();
        if let Some(message) = state.buffer.pop_front() {
            return Claim::Ready(message);
        }
        Claim::Waiting(self.register(&mut state))
    }

    /// Registers a waiter without looking at the buffer. Only valid on a
    /// queue known to have nothing buffered, such as a fresh one.
    pub(crate) fn subscribe(self: &Arc<Self>) -> Waiter<T> {
        let mut state = self.state.lock();
        self.register(&mut state)
    }

    fn register(self: &Arc<Self>, state: &mut QueueState<T>) -> Waiter<T> {
        let (tx, rx) = oneshot::channel();
        let id = state.next_slot;
        state.next_slot += 1;
        state.waiters.push_back(Slot { id, tx });
        tracing::debug!(queue = %self.name, waiters = state.waiters.len(), "waiter registered");

        Waiter {
            queue: Arc::clone(self),
            slot: id,
            rx,
            settled: false,
        }
    }

    /// Removes a waiter slot wherever it sits. Returns false when a put
    /// already claimed it.
    fn deregister(&self, slot: u64) -> bool {
        let mut state = self.state.lock();
        match state.waiters.iter().position(|s| s.id == slot) {
            Some(index) => {
                state.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Takes the head message, waiting for a put if the buffer is empty.
    pub async fn get(self: &Arc<Self>, ctx: &WaitContext) -> BrokerResult<T> {
        match self.claim() {
            Claim::Ready(message) => Ok(message),
            Claim::Waiting(mut waiter) => waiter.wait(ctx).await,
        }
    }
}

/// A registered consumer awaiting hand-off.
///
/// Holds the receive side of its slot. Dropping an unsettled waiter
/// deregisters the slot; a message that was handed off in the meantime
/// is put back on the queue.
#[derive(Debug)]
pub struct Waiter<T> {
    queue: Arc<MessageQueue<T>>,
    slot: u64,
    rx: oneshot::Receiver<T>,
    settled: bool,
}

impl<T> Waiter<T> {
    /// Waits for hand-off, explicit cancellation or the deadline,
    /// whichever comes first. No queue lock is held while suspended.
    ///
    /// Cancellation and hand-off race for the slot under the queue lock.
    /// If a put removed the slot first the message is returned even
    /// though the context fired.
    pub async fn wait(&mut self, ctx: &WaitContext) -> BrokerResult<T> {
        if self.settled {
            return Err(BrokerError::Canceled);
        }

        let reason = tokio::select! {
            biased;
            delivered = &mut self.rx => {
                self.settled = true;
                return delivered.map_err(|_| BrokerError::Canceled);
            }
            reason = ctx.done() => reason,
        };

        self.settled = true;
        if self.queue.deregister(self.slot) {
            tracing::debug!(queue = %self.queue.name, error = %reason, "waiter gave up");
            return Err(reason);
        }

        // The put that claimed the slot sent under the lock we just took.
        self.rx.try_recv().map_err(|_| reason)
    }

    /// Settles the waiter without waiting. Returns a message that was
    /// handed off but never observed, so the caller can put it back.
    pub fn abandon(&mut self) -> Option<T> {
        if self.settled {
            return None;
        }
        self.settled = true;
        if self.queue.deregister(self.slot) {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn queue(&self) -> &Arc<MessageQueue<T>> {
        &self.queue
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        if let Some(message) = self.abandon() {
            tracing::warn!(queue = %self.queue.name, "restoring message from dropped waiter");
            self.queue.restore(message);
        }
    }
}
