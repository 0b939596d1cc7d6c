use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use redis_protocol::resp2::decode::decode;
use redis_protocol::resp2::encode::encode;
use redis_protocol::resp2::types::{OwnedFrame as RespFrame, Resp2Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::handler::{handle_command, CommandContext};
use crate::Broker;

#[derive(Debug, Clone)]
pub struct RespConfig {
    pub host: String,
    pub port: u16,
    pub get_timeout: Duration,
}

impl Default for RespConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6379,
            get_timeout: Duration::from_secs(30),
        }
    }
}

/// RESP Server
pub struct RespServer {
    config: RespConfig,
    broker: Arc<Broker>,
    shutdown: CancellationToken,
}

impl RespServer {
    pub fn new(config: RespConfig, broker: Arc<Broker>) -> Self {
        Self {
            config,
            broker,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the accept loop and cancels every
    /// blocked command.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("queue broker RESP server listening on {}", addr);
        self.serve(listener).await
    }

    /// Accepts connections on an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (socket, peer_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutting down, no longer accepting connections");
                    return Ok(());
                }
            };
            tracing::info!("new connection from {}", peer_addr);

            let broker = self.broker.clone();
            let get_timeout = self.config.get_timeout;
            let cancel = self.shutdown.child_token();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, broker, get_timeout, cancel).await {
                    tracing::error!("connection error: {} (kind: {:?})", e, e.kind());
                }
                tracing::debug!("connection from {} closed", peer_addr);
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    broker: Arc<Broker>,
    get_timeout: Duration,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);
    let ctx = CommandContext {
        broker: &broker,
        get_timeout,
        cancel,
    };

    loop {
        while let Some(frame) = next_frame(&mut socket, &mut buffer).await? {
            tracing::debug!("received frame: {:?}", frame);

            // Keep reading while the command runs so a disconnect cancels
            // a blocked BRPOP instead of leaving its waiter behind.
            let mut closed = false;
            let response = {
                let command = handle_command(frame, &ctx);
                tokio::pin!(command);
                loop {
                    tokio::select! {
                        response = &mut command => break response,
                        read = socket.read_buf(&mut buffer), if !closed => {
                            match read {
                                Ok(n) if n > 0 => {}
                                Ok(_) => {
                                    closed = true;
                                    ctx.cancel.cancel();
                                }
                                Err(e) => {
                                    tracing::error!("read error mid-command: {} (kind: {:?})", e, e.kind());
                                    closed = true;
                                    ctx.cancel.cancel();
                                }
                            }
                        }
                    }
                }
            };

            if closed {
                tracing::debug!("client went away mid-command");
                return Ok(());
            }

            tracing::debug!("sending response: {:?}", response);
            write_frame(&mut socket, &response).await?;

            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
        }

        let n = tokio::select! {
            read = socket.read_buf(&mut buffer) => read?,
            _ = ctx.cancel.cancelled() => {
                tracing::debug!("closing idle connection on shutdown");
                return Ok(());
            }
        };
        tracing::debug!("read {} bytes, buffer len: {}", n, buffer.len());
        if n == 0 {
            tracing::debug!("connection closed by client");
            return Ok(());
        }
    }
}

/// Decodes the next complete frame already in `buffer`. Malformed input
/// gets an error reply and the buffer is discarded.
async fn next_frame(
    socket: &mut TcpStream,
    buffer: &mut BytesMut,
) -> std::io::Result<Option<RespFrame>> {
    match decode(&buffer[..]) {
        Ok(Some((frame, consumed))) => {
            buffer.advance(consumed);
            Ok(Some(frame))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            tracing::error!("parse error: {:?}", e);
            buffer.clear();
            write_frame(socket, &RespFrame::Error(format!("ERR {}", e))).await?;
            Ok(None)
        }
    }
}

async fn write_frame(socket: &mut TcpStream, frame: &RespFrame) -> std::io::Result<()> {
    let mut bytes = vec![0u8; frame.encode_len()];
    let written = encode(&mut bytes, frame).map_err(|e| {
        tracing::error!("encode error: {:?}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{:?}", e))
    })?;
    socket.write_all(&bytes[..written]).await
}
