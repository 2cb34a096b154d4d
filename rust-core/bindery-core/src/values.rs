//! # Raw Sources
//!
//! The string-keyed, multi-valued maps a request exposes to the binder
//! (query, path captures, form, headers) and the uploaded files of a
//! multipart body.

use crate::error::{Error, Result};
use hyper::body::Bytes;
use hyper::HeaderMap;
use std::collections::HashMap;
use std::io::Cursor;

/// A multi-map from field name to raw values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    inner: HashMap<String, Vec<String>>,
}

impl Values {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` string
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if the input is not valid urlencoded data.
    pub fn parse_urlencoded(input: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(input).map_err(|e| Error::BadRequest {
                reason: format!("invalid urlencoded data: {e}"),
            })?;
        Ok(pairs.into_iter().collect())
    }

    /// Collect headers under canonical names (`content-type` -> `Content-Type`)
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (canonical_header_key(name.as_str()), v.to_string()))
            })
            .collect()
    }

    /// Append a value under `key`
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Replace all values under `key` with one value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// First value under `key`, or `""` when absent
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.inner
            .get(key)
            .and_then(|v| v.first())
            .map_or("", String::as_str)
    }

    /// All values under `key`
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map_or(&[][..], Vec::as_slice)
    }

    /// Whether `key` has at least one value
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        !self.get_all(key).is_empty()
    }

    /// Number of distinct keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Append every value of `other`
    pub fn merge(&mut self, other: &Self) {
        for (key, values) in &other.inner {
            self.inner
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// Iterate over keys and their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.add(k, v);
        }
        values
    }
}

/// `x-request-id` -> `X-Request-Id`
#[must_use]
pub fn canonical_header_key(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// One uploaded file of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client-supplied file name
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Declared content type of the part
    pub content_type: String,
    /// File contents
    pub data: Bytes,
}

impl UploadedFile {
    /// Describe an upload held in memory
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            filename: filename.into(),
            size: data.len() as u64,
            content_type: content_type.into(),
            data,
        }
    }

    /// Open the contents for reading
    #[must_use]
    pub fn open(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }
}

/// Uploaded files keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Files {
    inner: HashMap<String, Vec<UploadedFile>>,
}

impl Files {
    /// Create an empty file map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an upload under `field`
    pub fn add(&mut self, field: impl Into<String>, file: UploadedFile) {
        self.inner.entry(field.into()).or_default().push(file);
    }

    /// Uploads under `field`
    #[must_use]
    pub fn get(&self, field: &str) -> &[UploadedFile] {
        self.inner.get(field).map_or(&[][..], Vec::as_slice)
    }

    /// Whether no file was uploaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// What one bind call reads from: values plus, for multipart bodies, files
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    values: &'a Values,
    files: Option<&'a Files>,
}

impl<'a> Source<'a> {
    /// A source without uploads
    #[must_use]
    pub const fn new(values: &'a Values) -> Self {
        Self {
            values,
            files: None,
        }
    }

    /// A source with uploads
    #[must_use]
    pub const fn with_files(values: &'a Values, files: &'a Files) -> Self {
        Self {
            values,
            files: Some(files),
        }
    }

    /// The value map
    #[must_use]
    pub const fn values(&self) -> &'a Values {
        self.values
    }

    /// Uploads under `field` (empty without a multipart body)
    #[must_use]
    pub fn files(&self, field: &str) -> &'a [UploadedFile] {
        self.files.map_or(&[][..], |f| f.get(field))
    }
}
