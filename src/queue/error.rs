//! Failure kinds surfaced by the queue engine.

/// Outcomes a caller can recover from. None of these leave shared state
/// modified, apart from a canceled waiter removing its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("queue limit exceeded (max queues: {max_queues})")]
    QueueLimitExceeded { max_queues: usize },

    #[error("message limit exceeded (max messages: {max_messages})")]
    MessageLimitExceeded { max_messages: usize },

    #[error("wait canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl BrokerError {
    /// Either capacity limit was hit.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            Self::QueueLimitExceeded { .. } | Self::MessageLimitExceeded { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

/// Result type for engine operations
pub type BrokerResult<T> = Result<T, BrokerError>;
