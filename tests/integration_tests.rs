use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use redis_protocol::resp2::decode::decode;
use redis_protocol::resp2::encode::encode;
use redis_protocol::resp2::types::{OwnedFrame as RespFrame, Resp2Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use queue_broker::{Broker, RespConfig, RespServer};

struct TestServer {
    addr: SocketAddr,
    broker: Arc<Broker>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_server(max_queues: usize, max_messages: usize) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let broker = Arc::new(Broker::new(max_queues, max_messages));

    let config = RespConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        get_timeout: Duration::from_millis(200),
    };
    let server = RespServer::new(config, broker.clone());
    let shutdown = server.shutdown_token();
    tokio::spawn(server.serve(listener));

    TestServer {
        addr,
        broker,
        shutdown,
    }
}

struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: BytesMut::new(),
        }
    }

    async fn send(&mut self, parts: &[&str]) {
        let frame = RespFrame::Array(
            parts
                .iter()
                .map(|p| RespFrame::BulkString(p.as_bytes().to_vec()))
                .collect(),
        );
        let mut bytes = vec![0u8; frame.encode_len()];
        let written = encode(&mut bytes, &frame).unwrap();
        self.stream.write_all(&bytes[..written]).await.unwrap();
    }

    async fn recv(&mut self) -> RespFrame {
        loop {
            if let Some((frame, consumed)) = decode(&self.buffer[..]).unwrap() {
                self.buffer.advance(consumed);
                return frame;
            }
            let n = self.stream.read_buf(&mut self.buffer).await.unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    async fn call(&mut self, parts: &[&str]) -> RespFrame {
        self.send(parts).await;
        self.recv().await
    }
}

fn bulk(s: &str) -> RespFrame {
    RespFrame::BulkString(s.as_bytes().to_vec())
}

async fn wait_for_waiters(broker: &Broker, name: &str, count: usize) {
    for _ in 0..200 {
        if broker.waiting(name) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} waiters on {}", count, name);
}

#[tokio::test]
async fn test_ping() {
    let server = start_server(0, 0).await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(
        client.call(&["PING"]).await,
        RespFrame::SimpleString(b"PONG".to_vec())
    );
}

#[tokio::test]
async fn test_end_to_end_single_message() {
    let server = start_server(0, 0).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client
        .call(&["LPUSH", "emails", r#"{"message":"welcome"}"#])
        .await;
    assert_eq!(reply, RespFrame::Integer(1));
    assert_eq!(client.call(&["LLEN", "emails"]).await, RespFrame::Integer(1));

    let reply = client.call(&["BRPOP", "emails", "1"]).await;
    assert_eq!(
        reply,
        RespFrame::Array(vec![bulk("emails"), bulk(r#"{"message":"welcome"}"#)])
    );
    assert!(!server.broker.is_tracked("emails"));
}

#[tokio::test]
async fn test_blocked_consumer_receives_later_put() {
    let server = start_server(0, 0).await;
    let mut consumer = Client::connect(server.addr).await;
    let mut producer = Client::connect(server.addr).await;

    consumer.send(&["BRPOP", "tasks", "5"]).await;
    wait_for_waiters(&server.broker, "tasks", 1).await;

    let start = Instant::now();
    let reply = producer.call(&["LPUSH", "tasks", r#"{"message":"go"}"#]).await;
    assert_eq!(reply, RespFrame::Integer(1));

    let reply = consumer.recv().await;
    assert_eq!(
        reply,
        RespFrame::Array(vec![bulk("tasks"), bulk(r#"{"message":"go"}"#)])
    );
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_brpop_timeout_returns_null() {
    let server = start_server(0, 0).await;
    let mut client = Client::connect(server.addr).await;

    // No timeout argument: the server default applies.
    let start = Instant::now();
    assert_eq!(client.call(&["BRPOP", "empty"]).await, RespFrame::Null);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(!server.broker.is_tracked("empty"));
}

#[tokio::test]
async fn test_disconnect_cancels_blocked_consumer() {
    let server = start_server(0, 0).await;

    {
        let mut consumer = Client::connect(server.addr).await;
        consumer.send(&["BRPOP", "jobs", "0"]).await;
        wait_for_waiters(&server.broker, "jobs", 1).await;
    }

    for _ in 0..200 {
        if !server.broker.is_tracked("jobs") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!server.broker.is_tracked("jobs"));
    assert_eq!(server.broker.waiting("jobs"), 0);

    // The put must not vanish into the departed consumer's slot.
    let mut producer = Client::connect(server.addr).await;
    producer.call(&["LPUSH", "jobs", r#"{"message":"kept"}"#]).await;
    assert_eq!(
        producer.call(&["RPOP", "jobs"]).await,
        bulk(r#"{"message":"kept"}"#)
    );
    assert_eq!(server.broker.stats().canceled_total, 1);
}

#[tokio::test]
async fn test_connection_reset_cancels_blocked_consumer() {
    let server = start_server(0, 0).await;

    {
        let mut consumer = Client::connect(server.addr).await;
        consumer.send(&["BRPOP", "jobs", "0"]).await;
        wait_for_waiters(&server.broker, "jobs", 1).await;
        // Zero linger makes the close an RST, so the server sees a read error.
        #[allow(deprecated)]
        consumer.stream.set_linger(Some(Duration::ZERO)).unwrap();
    }

    for _ in 0..200 {
        if !server.broker.is_tracked("jobs") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!server.broker.is_tracked("jobs"));
    assert_eq!(server.broker.stats().canceled_total, 1);
}

#[tokio::test]
async fn test_limits_reported_as_overloaded() {
    let server = start_server(1, 1).await;
    let mut client = Client::connect(server.addr).await;

    client.call(&["LPUSH", "a", r#"{"message":"x"}"#]).await;

    let reply = client.call(&["LPUSH", "a", r#"{"message":"y"}"#]).await;
    assert!(matches!(reply, RespFrame::Error(e) if e.starts_with("OVERLOADED message limit")));

    let reply = client.call(&["LPUSH", "b", r#"{"message":"z"}"#]).await;
    assert!(matches!(reply, RespFrame::Error(e) if e.starts_with("OVERLOADED queue limit")));
}

#[tokio::test]
async fn test_malformed_payload_rejected() {
    let server = start_server(0, 0).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(&["LPUSH", "a", r#"{"message":""}"#]).await;
    assert!(matches!(reply, RespFrame::Error(e) if e.starts_with("ERR invalid message format")));
    assert_eq!(server.broker.queue_count(), 0);

    // The connection stays usable.
    assert_eq!(
        client.call(&["PING"]).await,
        RespFrame::SimpleString(b"PONG".to_vec())
    );
}

#[tokio::test]
async fn test_pipelined_commands() {
    let server = start_server(0, 0).await;
    let mut client = Client::connect(server.addr).await;

    client.send(&["LPUSH", "p", r#"{"message":"1"}"#, r#"{"message":"2"}"#]).await;
    client.send(&["RPOP", "p"]).await;
    client.send(&["RPOP", "p"]).await;

    assert_eq!(client.recv().await, RespFrame::Integer(2));
    assert_eq!(client.recv().await, bulk(r#"{"message":"1"}"#));
    assert_eq!(client.recv().await, bulk(r#"{"message":"2"}"#));
}

#[tokio::test]
async fn test_info_reports_stats() {
    let server = start_server(0, 0).await;
    let mut client = Client::connect(server.addr).await;

    client.call(&["LPUSH", "a", r#"{"message":"x"}"#]).await;
    let reply = client.call(&["INFO"]).await;

    let json = match reply {
        RespFrame::BulkString(json) => json,
        other => panic!("expected bulk string, got {:?}", other),
    };
    let stats: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(stats["active_queues"], 1);
    assert_eq!(stats["buffered_total"], 1);
}

#[tokio::test]
async fn test_shutdown_cancels_blocked_consumer() {
    let server = start_server(0, 0).await;
    let mut consumer = Client::connect(server.addr).await;

    consumer.send(&["BRPOP", "jobs", "0"]).await;
    wait_for_waiters(&server.broker, "jobs", 1).await;

    server.shutdown.cancel();
    let reply = consumer.recv().await;
    assert!(matches!(reply, RespFrame::Error(e) if e.starts_with("CANCELED")));
    assert!(!server.broker.is_tracked("jobs"));
}
