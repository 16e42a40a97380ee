//! Content marshalers.
//!
//! A [`MarshalerRegistry`] maps MIME essences to a [`Marshaler`]. The request
//! `Content-Type` selects the decoder; the `Accept` header, falling back to
//! the decoder, selects the encoder. Unregistered types use the wildcard
//! entry, structured JSON.
//!
//! Decoding builds a fresh message and only returns it once the whole
//! payload has been read, so a failure never leaves a half-filled message
//! behind.

mod file_reader;
mod form;
mod json;
mod multipart;
mod text;

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::error::MarshalError;
use crate::message::Message;

pub use file_reader::read_file;

/// MIME type of structured JSON.
pub const MIME_JSON: &str = "application/json";
/// MIME type of URL-encoded forms.
pub const MIME_FORM: &str = "application/x-www-form-urlencoded";
/// MIME type of multipart uploads.
pub const MIME_MULTIPART: &str = "multipart/form-data";
/// MIME type of plain text.
pub const MIME_TEXT: &str = "text/plain";

/// One encode/decode strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marshaler {
    /// Structured JSON: every field is written, unknown input fields are
    /// ignored.
    Json,
    /// `key=value&...` request bodies; responses are JSON.
    Form,
    /// First uploaded file of a multipart body; responses are JSON.
    Multipart,
    /// Body wrapped as `{"data": "<text>"}`; responses are compact text.
    Text,
}

impl Marshaler {
    /// Content type of encoded responses.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => MIME_TEXT,
            Self::Json | Self::Form | Self::Multipart => MIME_JSON,
        }
    }

    /// Decodes `body` sent with `content_type`.
    pub async fn decode<M: Message>(self, body: Bytes, content_type: &str) -> Result<M, MarshalError> {
        match self {
            Self::Json => json::decode(&body),
            Self::Form => form::decode(&body),
            Self::Multipart => multipart::decode(body, content_type).await,
            Self::Text => text::decode(&body),
        }
    }

    /// Encodes `message`.
    pub fn encode<M: Message>(self, message: &M) -> Result<Vec<u8>, MarshalError> {
        match self {
            Self::Text => text::encode(message),
            Self::Json | Self::Form | Self::Multipart => json::encode(message),
        }
    }
}

impl fmt::Display for Marshaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Form => "form",
            Self::Multipart => "multipart",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Marshalers keyed by MIME essence.
#[derive(Debug, Clone)]
pub struct MarshalerRegistry {
    by_mime: HashMap<String, Marshaler>,
    wildcard: Marshaler,
}

impl Default for MarshalerRegistry {
    fn default() -> Self {
        Self::empty()
            .register(MIME_JSON, Marshaler::Json)
            .register(MIME_FORM, Marshaler::Form)
            .register(MIME_MULTIPART, Marshaler::Multipart)
            .register(MIME_TEXT, Marshaler::Text)
    }
}

impl MarshalerRegistry {
    /// A registry with only the JSON wildcard.
    pub fn empty() -> Self {
        Self {
            by_mime: HashMap::new(),
            wildcard: Marshaler::Json,
        }
    }

    /// Maps `mime` to `marshaler`.
    #[must_use]
    pub fn register(mut self, mime: &str, marshaler: Marshaler) -> Self {
        self.by_mime.insert(mime.to_ascii_lowercase(), marshaler);
        self
    }

    fn lookup(&self, content_type: &str) -> Option<Marshaler> {
        let parsed: mime::Mime = content_type.trim().parse().ok()?;
        self.by_mime.get(parsed.essence_str()).copied()
    }

    /// Decoder for a request `Content-Type`.
    pub fn inbound(&self, content_type: Option<&str>) -> Marshaler {
        content_type
            .and_then(|value| self.lookup(value))
            .unwrap_or(self.wildcard)
    }

    /// Encoder for a request `Accept` header, falling back to `inbound`.
    pub fn outbound(&self, accept: Option<&str>, inbound: Marshaler) -> Marshaler {
        accept
            .into_iter()
            .flat_map(|value| value.split(','))
            .find_map(|candidate| self.lookup(candidate))
            .unwrap_or(inbound)
    }
}
