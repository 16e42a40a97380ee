//! Plain text.

use crate::error::MarshalError;
use crate::message::Message;

pub(super) fn decode<M: Message>(body: &[u8]) -> Result<M, MarshalError> {
    let text = std::str::from_utf8(body).map_err(MarshalError::decode)?;
    serde_json::from_value(serde_json::json!({ "data": text })).map_err(MarshalError::decode)
}

pub(super) fn encode<M: Message>(message: &M) -> Result<Vec<u8>, MarshalError> {
    serde_json::to_string(message)
        .map(String::into_bytes)
        .map_err(MarshalError::encode)
}
