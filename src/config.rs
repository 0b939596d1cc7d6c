use std::time::Duration;

use clap::Parser;

use crate::resp::RespConfig;

/// Process configuration. Every flag can also be set from the
/// environment; values are fixed for the lifetime of the process.
#[derive(Debug, Clone, Parser)]
#[command(name = "queue-broker", version, about = "In-memory multi-queue message broker")]
pub struct BrokerConfig {
    /// Address to bind the RESP listener to
    #[arg(long, env = "BROKER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the RESP listener to
    #[arg(long, env = "BROKER_PORT", default_value_t = 6379)]
    pub port: u16,

    /// Maximum number of active queues (0 = unlimited)
    #[arg(long, env = "BROKER_MAX_QUEUES", default_value_t = 0)]
    pub max_queues: usize,

    /// Maximum buffered messages per queue (0 = unlimited)
    #[arg(long, env = "BROKER_MAX_MESSAGES", default_value_t = 0)]
    pub max_messages: usize,

    /// Default BRPOP timeout in seconds when the client gives none
    #[arg(long = "timeout", env = "BROKER_GET_TIMEOUT", default_value_t = 30)]
    pub get_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6379,
            max_queues: 0,
            max_messages: 0,
            get_timeout_secs: 30,
        }
    }
}

impl BrokerConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.get_timeout_secs)
    }

    pub fn resp(&self) -> RespConfig {
        RespConfig {
            host: self.host.clone(),
            port: self.port,
            get_timeout: self.get_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unlimited() {
        let config = BrokerConfig::try_parse_from(["queue-broker"]).unwrap();
        assert_eq!(config.max_queues, 0);
        assert_eq!(config.max_messages, 0);
        assert_eq!(config.get_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn flags_override_defaults() {
        let config = BrokerConfig::try_parse_from([
            "queue-broker",
            "--port",
            "7000",
            "--max-queues",
            "10",
            "--max-messages",
            "5",
            "--timeout",
            "2",
        ])
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.max_queues, 10);
        assert_eq!(config.max_messages, 5);
        assert_eq!(config.resp().get_timeout, Duration::from_secs(2));
    }

    #[test]
    fn rejects_negative_limits() {
        assert!(BrokerConfig::try_parse_from(["queue-broker", "--max-queues", "-1"]).is_err());
    }
}
