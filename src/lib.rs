// Queue broker - in-memory multi-queue message broker
//
// This library provides the queue engine and its RESP transport.
// Binary entry point is in src/main.rs

pub mod config;
pub mod queue;
pub mod resp;

pub use config::BrokerConfig;
pub use queue::{
    BrokerError, BrokerResult, Delivery, Message, MessageQueue, QueueManager, StatsSnapshot,
    WaitContext,
};
pub use resp::{RespConfig, RespServer};

/// The engine as the server runs it, carrying JSON messages.
pub type Broker = QueueManager<Message>;
