// Queue engine exports

pub mod context;
pub mod error;
pub mod manager;
pub mod message;
pub mod message_queue;
pub mod stats;

pub use context::WaitContext;
pub use error::{BrokerError, BrokerResult};
pub use manager::QueueManager;
pub use message::{Message, MessageError};
pub use message_queue::{Claim, Delivery, MessageQueue, Waiter};
pub use stats::{BrokerStats, StatsSnapshot};
