//! Multipart file uploads.
//!
//! Only the first part carrying a `filename` is read. It is written to a
//! scratch file, turned into `{"filename": ..., "data": ...}` by
//! [`read_file`](super::read_file), and that JSON is decoded into the
//! target message.

use std::convert::Infallible;
use std::io::Write;

use bytes::Bytes;

use super::file_reader;
use crate::error::MarshalError;
use crate::message::Message;

pub(super) async fn decode<M: Message>(body: Bytes, content_type: &str) -> Result<M, MarshalError> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| MarshalError::MissingBoundary)?;
    let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let (filename, data) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(MarshalError::decode)?
            .ok_or(MarshalError::NoFilePart)?;
        if let Some(filename) = field.file_name().map(ToString::to_string) {
            let data = field.bytes().await.map_err(MarshalError::decode)?;
            break (filename, data);
        }
    };

    tracing::debug!(filename = %filename, size = data.len(), "received upload");

    let value = tokio::task::spawn_blocking(move || persist_and_read(&filename, &data))
        .await
        .map_err(|e| MarshalError::Io(std::io::Error::other(e)))??;

    serde_json::from_value(value).map_err(MarshalError::decode)
}

fn persist_and_read(filename: &str, data: &[u8]) -> Result<serde_json::Value, MarshalError> {
    let suffix = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let mut scratch = tempfile::Builder::new()
        .prefix("upload_")
        .suffix(&suffix)
        .tempfile()?;
    scratch.write_all(data)?;
    scratch.flush()?;

    file_reader::read_file(scratch.path(), filename)
}
