//! Structured JSON.

use crate::error::MarshalError;
use crate::message::Message;

/// An empty body decodes to the default message.
pub(super) fn decode<M: Message>(body: &[u8]) -> Result<M, MarshalError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(M::default());
    }
    serde_json::from_slice(body).map_err(MarshalError::decode)
}

pub(super) fn encode<M: Message>(message: &M) -> Result<Vec<u8>, MarshalError> {
    serde_json::to_vec(message).map_err(MarshalError::encode)
}
