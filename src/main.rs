use std::sync::Arc;

use clap::Parser;
use queue_broker::{Broker, BrokerConfig, RespServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = BrokerConfig::parse();
    tracing::info!(
        max_queues = config.max_queues,
        max_messages = config.max_messages,
        get_timeout_secs = config.get_timeout_secs,
        "starting queue broker"
    );

    let broker = Arc::new(Broker::from_config(&config));
    let server = RespServer::new(config.resp(), broker);

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown");
            shutdown.cancel();
        }
    });

    server.run().await?;

    Ok(())
}
