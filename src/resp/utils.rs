use redis_protocol::resp2::types::OwnedFrame as RespFrame;

pub fn extract_string(frame: &RespFrame) -> Result<String, RespFrame> {
    match frame {
        RespFrame::BulkString(data) | RespFrame::SimpleString(data) => {
            Ok(String::from_utf8_lossy(data).to_string())
        }
        _ => Err(RespFrame::Error("ERR invalid string".to_string())),
    }
}

pub fn extract_bytes(frame: &RespFrame) -> Result<&[u8], RespFrame> {
    match frame {
        RespFrame::BulkString(data) | RespFrame::SimpleString(data) => Ok(data),
        _ => Err(RespFrame::Error("ERR invalid bytes".to_string())),
    }
}

pub fn extract_integer(frame: &RespFrame) -> Result<i64, RespFrame> {
    match frame {
        RespFrame::Integer(n) => Ok(*n),
        RespFrame::BulkString(data) | RespFrame::SimpleString(data) => {
            let s = String::from_utf8_lossy(data);
            s.trim()
                .parse::<i64>()
                .map_err(|_| RespFrame::Error("ERR invalid integer".to_string()))
        }
        _ => Err(RespFrame::Error("ERR invalid integer".to_string())),
    }
}

pub fn wrong_arity(command: &str) -> RespFrame {
    RespFrame::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_from_bulk_string() {
        let frame = RespFrame::BulkString(b"42".to_vec());
        assert_eq!(extract_integer(&frame), Ok(42));
    }

    #[test]
    fn integer_rejects_garbage() {
        let frame = RespFrame::BulkString(b"soon".to_vec());
        assert!(extract_integer(&frame).is_err());
        assert!(extract_integer(&RespFrame::Null).is_err());
    }

    #[test]
    fn string_rejects_arrays() {
        assert!(extract_string(&RespFrame::Array(vec![])).is_err());
        assert_eq!(
            extract_string(&RespFrame::SimpleString(b"jobs".to_vec())),
            Ok("jobs".to_string())
        );
    }
}
