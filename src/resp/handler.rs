use std::time::Duration;

use redis_protocol::resp2::types::OwnedFrame as RespFrame;
use tokio_util::sync::CancellationToken;

use crate::queue::{BrokerError, Message, WaitContext};
use crate::Broker;

use super::utils::{extract_bytes, extract_integer, extract_string, wrong_arity};

/// Per-command state supplied by the connection.
pub struct CommandContext<'a> {
    pub broker: &'a Broker,
    /// BRPOP timeout when the client does not give one.
    pub get_timeout: Duration,
    /// Fires when the client goes away or the server shuts down.
    pub cancel: CancellationToken,
}

pub async fn handle_command(frame: RespFrame, ctx: &CommandContext<'_>) -> RespFrame {
    let cmd_array = match frame {
        RespFrame::Array(arr) => arr,
        _ => {
            return RespFrame::Error("ERR expected array".into());
        }
    };

    if cmd_array.is_empty() {
        return RespFrame::Error("ERR empty command".to_string());
    }

    let command_name = match &cmd_array[0] {
        RespFrame::BulkString(data) | RespFrame::SimpleString(data) => {
            String::from_utf8_lossy(data).to_uppercase()
        }
        _ => {
            return RespFrame::Error("ERR invalid command format".to_string());
        }
    };

    match command_name.as_str() {
        "PING" => handle_ping(&cmd_array),
        "LPUSH" => handle_lpush(&cmd_array, ctx),
        "RPOP" => handle_rpop(&cmd_array, ctx),
        "BRPOP" => handle_brpop(&cmd_array, ctx).await,
        "LLEN" => handle_llen(&cmd_array, ctx),
        "INFO" => handle_info(ctx),
        "COMMAND" => handle_command_docs(),
        _ => RespFrame::Error(format!("ERR unknown command '{}'", command_name)),
    }
}

/// Maps engine failures to replies. A timed-out wait looks the same as
/// an empty queue; overload gets its own error prefix so clients can
/// back off.
fn error_frame(err: BrokerError) -> RespFrame {
    match err {
        BrokerError::QueueLimitExceeded { .. } | BrokerError::MessageLimitExceeded { .. } => {
            RespFrame::Error(format!("OVERLOADED {}", err))
        }
        BrokerError::DeadlineExceeded => RespFrame::Null,
        BrokerError::Canceled => RespFrame::Error("CANCELED client gave up".to_string()),
    }
}

fn encode_message(message: &Message) -> RespFrame {
    match message.encode() {
        Ok(bytes) => RespFrame::BulkString(bytes),
        Err(e) => RespFrame::Error(format!("ERR {}", e)),
    }
}

/// PING [message]
fn handle_ping(cmd: &[RespFrame]) -> RespFrame {
    match cmd.len() {
        1 => RespFrame::SimpleString(b"PONG".to_vec()),
        2 => cmd[1].clone(),
        _ => wrong_arity("ping"),
    }
}

/// LPUSH queue value [value ...]
///
/// Each value must be a JSON message. Values are pushed in order and the
/// command stops at the first rejected one.
fn handle_lpush(cmd: &[RespFrame], ctx: &CommandContext<'_>) -> RespFrame {
    if cmd.len() < 3 {
        return wrong_arity("lpush");
    }

    let queue_name = match extract_string(&cmd[1]) {
        Ok(name) => name,
        Err(e) => return e,
    };

    let mut count = 0;
    for value in &cmd[2..] {
        let bytes = match extract_bytes(value) {
            Ok(data) => data,
            Err(e) => return e,
        };

        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => return RespFrame::Error(format!("ERR {}", e)),
        };

        if let Err(e) = ctx.broker.put(&queue_name, message) {
            return error_frame(e);
        }
        count += 1;
    }

    RespFrame::Integer(count)
}

/// RPOP queue
fn handle_rpop(cmd: &[RespFrame], ctx: &CommandContext<'_>) -> RespFrame {
    if cmd.len() != 2 {
        return wrong_arity("rpop");
    }

    let queue_name = match extract_string(&cmd[1]) {
        Ok(name) => name,
        Err(e) => return e,
    };

    match ctx.broker.try_get(&queue_name) {
        Some(message) => encode_message(&message),
        None => RespFrame::Null,
    }
}

/// BRPOP queue [timeout]
///
/// Timeout is in seconds. Without one the configured default applies;
/// zero waits until a message arrives or the client disconnects.
async fn handle_brpop(cmd: &[RespFrame], ctx: &CommandContext<'_>) -> RespFrame {
    if cmd.len() != 2 && cmd.len() != 3 {
        return wrong_arity("brpop");
    }

    let queue_name = match extract_string(&cmd[1]) {
        Ok(name) => name,
        Err(e) => return e,
    };

    let wait = WaitContext::from_token(ctx.cancel.child_token());
    let wait = match cmd.get(2).map(extract_integer) {
        None => wait.timeout(ctx.get_timeout),
        Some(Err(e)) => return e,
        Some(Ok(secs)) if secs < 0 => {
            return RespFrame::Error("ERR timeout must be non-negative".to_string());
        }
        Some(Ok(0)) => wait,
        Some(Ok(secs)) => wait.timeout(Duration::from_secs(secs as u64)),
    };

    match ctx.broker.get(&queue_name, &wait).await {
        Ok(message) => RespFrame::Array(vec![
            RespFrame::BulkString(queue_name.into_bytes()),
            encode_message(&message),
        ]),
        Err(e) => error_frame(e),
    }
}

/// LLEN queue
fn handle_llen(cmd: &[RespFrame], ctx: &CommandContext<'_>) -> RespFrame {
    if cmd.len() != 2 {
        return wrong_arity("llen");
    }

    match extract_string(&cmd[1]) {
        Ok(name) => RespFrame::Integer(ctx.broker.queue_len(&name) as i64),
        Err(e) => e,
    }
}

/// INFO - broker counters as JSON
fn handle_info(ctx: &CommandContext<'_>) -> RespFrame {
    match serde_json::to_vec(&ctx.broker.stats()) {
        Ok(json) => RespFrame::BulkString(json),
        Err(e) => RespFrame::Error(format!("ERR {}", e)),
    }
}

/// COMMAND - Return supported commands
fn handle_command_docs() -> RespFrame {
    RespFrame::Array(
        ["PING", "LPUSH", "RPOP", "BRPOP", "LLEN", "INFO"]
            .iter()
            .map(|name| RespFrame::BulkString(name.as_bytes().to_vec()))
            .collect(),
    )
}
