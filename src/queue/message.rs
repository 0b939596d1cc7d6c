use serde::{Deserialize, Serialize};

/// Payload carried through the broker by the RESP transport.
///
/// On the wire a message is the JSON object `{"message": "<text>"}`.
/// The engine itself is generic and never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "message")]
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid message format: empty message")]
    Empty,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Decodes a JSON payload, rejecting malformed input and empty text.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let message: Message = serde_json::from_slice(bytes)?;
        if message.text.is_empty() {
            return Err(MessageError::Empty);
        }
        Ok(message)
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }
}
