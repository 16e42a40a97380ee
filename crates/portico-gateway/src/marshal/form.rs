//! URL-encoded forms.

use crate::error::MarshalError;
use crate::message::{form_to_json, Message};

pub(super) fn decode<M: Message>(body: &[u8]) -> Result<M, MarshalError> {
    let fields: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(MarshalError::decode)?;

    if let Some(populated) = M::from_form(&fields) {
        return populated;
    }
    serde_json::from_value(form_to_json(&fields)).map_err(MarshalError::decode)
}
