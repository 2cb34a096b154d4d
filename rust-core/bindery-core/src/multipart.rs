//! # Multipart Bodies
//!
//! Reader for `multipart/form-data` request bodies, built on `multer`.
//! Text parts become form values, parts with a `filename` become
//! [`UploadedFile`]s.
//!
//! The body is already buffered when this runs, so the parser is driven to
//! completion on the calling thread without touching the runtime.

use crate::values::{Files, UploadedFile, Values};
use hyper::body::Bytes;
use std::convert::Infallible;
use thiserror::Error;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Why a multipart body could not be read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    /// The request is not `multipart/form-data` or lacks a boundary
    #[error("request Content-Type isn't multipart/form-data")]
    NotMultipart,

    /// The body does not follow the multipart framing
    #[error("multipart: {0}")]
    Malformed(String),

    /// A text part is not valid UTF-8
    #[error("multipart field `{field}` is not valid utf-8")]
    InvalidText {
        /// Form field name
        field: String,
        /// The part's bytes, lossily decoded
        value: String,
    },
}

/// Extract the boundary parameter of a `multipart/form-data` content type
#[must_use]
pub fn boundary(content_type: &str) -> Option<String> {
    let media = content_type.split(';').next()?.trim();
    if !media.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    multer::parse_boundary(content_type).ok()
}

/// Parse a multipart body into values and uploads
///
/// # Errors
///
/// Returns `MultipartError::Malformed` if the framing, a part header block or
/// a part name is missing or broken, and `MultipartError::InvalidText` for a
/// text part that is not UTF-8.
pub fn parse(body: &Bytes, boundary: &str) -> Result<(Values, Files), MultipartError> {
    futures::executor::block_on(read_parts(body.clone(), boundary))
}

async fn read_parts(body: Bytes, boundary: &str) -> Result<(Values, Files), MultipartError> {
    let malformed = |e: multer::Error| MultipartError::Malformed(e.to_string());
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut values = Values::new();
    let mut files = Files::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field
            .name()
            .map(str::to_string)
            .ok_or_else(|| MultipartError::Malformed("missing form-data name".to_string()))?;
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(ToString::to_string);
        let data = field.bytes().await.map_err(malformed)?;

        match filename {
            Some(filename) => {
                let content_type =
                    content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
                files.add(name, UploadedFile::new(filename, content_type, data));
            }
            None => match std::str::from_utf8(&data) {
                Ok(text) => values.add(name, text),
                Err(_) => {
                    return Err(MultipartError::InvalidText {
                        field: name,
                        value: String::from_utf8_lossy(&data).into_owned(),
                    })
                }
            },
        }
    }
    Ok((values, files))
}
