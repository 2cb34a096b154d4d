//! # HTTP Request
//!
//! Request wrapper with lazy parsing.
//!
//! - The body is collected once by the server, under its size limit
//! - Query, form and multipart maps are parsed on first access and cached
//! - Header values are exposed under canonical names (`Content-Type`)

use crate::error::{Error, Result};
use crate::multipart::{self, MultipartError};
use crate::router::Method;
use crate::values::{Files, Values};
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::HeaderMap;
use once_cell::unsync::OnceCell;
use std::net::SocketAddr;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An inbound request with its body already read
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query_string: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    query: OnceCell<Values>,
    header_values: OnceCell<Values>,
    form: OnceCell<std::result::Result<Values, String>>,
    multipart: OnceCell<std::result::Result<(Values, Files), MultipartError>>,
}

impl Request {
    /// Create a request for `uri` (path plus optional query string)
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query_string) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (uri.to_string(), None),
        };
        Self {
            method,
            path,
            query_string,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            query: OnceCell::new(),
            header_values: OnceCell::new(),
            form: OnceCell::new(),
            multipart: OnceCell::new(),
        }
    }

    /// Add a header; invalid names or values are ignored
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Record the peer address
    #[must_use]
    pub const fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Read a hyper request, rejecting bodies over `max_body_size`
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or actual body
    /// exceeds the limit, `Error::BadRequest` for unsupported methods, and
    /// `Error::Http` if the body stream fails.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from_hyper(req.method()).ok_or_else(|| Error::BadRequest {
            reason: format!("unsupported method '{}'", req.method()),
        })?;

        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(actual) = declared.filter(|&len| len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual,
            });
        }

        let uri = req.uri().clone();
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        if body.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: body.len(),
            });
        }

        let mut request = Self::new(method, uri.path());
        request.query_string = uri.query().map(String::from);
        request.headers = parts.headers;
        request.body = body;
        Ok(request)
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Peer address, when served over the network
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Raw header map
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Append a header; invalid names or values are ignored
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(n, v);
            self.header_values = OnceCell::new();
        }
    }

    /// `Content-Type` header, or `""`
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.header(CONTENT_TYPE.as_str()).unwrap_or("")
    }

    /// Request body
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Query parameters; a malformed query string reads as empty
    pub fn query(&self) -> &Values {
        self.query.get_or_init(|| {
            self.query_string
                .as_deref()
                .map(|q| {
                    Values::parse_urlencoded(q).unwrap_or_else(|e| {
                        tracing::debug!(error = %e, "ignoring malformed query string");
                        Values::new()
                    })
                })
                .unwrap_or_default()
        })
    }

    /// Headers as a value map under canonical names
    pub fn header_values(&self) -> &Values {
        self.header_values
            .get_or_init(|| Values::from_headers(&self.headers))
    }

    /// Urlencoded body values followed by query values
    ///
    /// The body is only read for POST, PUT and PATCH requests with an
    /// urlencoded (or absent) content type.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if the body is not valid urlencoded data.
    pub fn form(&self) -> Result<&Values> {
        self.form
            .get_or_init(|| {
                let mut values = if self.has_urlencoded_body() {
                    let text = std::str::from_utf8(&self.body)
                        .map_err(|_| "form body is not utf-8".to_string())?;
                    Values::parse_urlencoded(text).map_err(|e| e.to_string())?
                } else {
                    Values::new()
                };
                values.merge(self.query());
                Ok(values)
            })
            .as_ref()
            .map_err(|reason| Error::BadRequest {
                reason: reason.clone(),
            })
    }

    /// Values and uploads of a `multipart/form-data` body
    ///
    /// # Errors
    ///
    /// Returns `MultipartError::NotMultipart` if the content type is not
    /// multipart, and the parse error if the body is malformed.
    pub fn multipart(&self) -> std::result::Result<(&Values, &Files), MultipartError> {
        self.multipart
            .get_or_init(|| {
                let boundary =
                    multipart::boundary(self.content_type()).ok_or(MultipartError::NotMultipart)?;
                multipart::parse(&self.body, &boundary)
            })
            .as_ref()
            .map(|(values, files)| (values, files))
            .map_err(Clone::clone)
    }

    fn has_urlencoded_body(&self) -> bool {
        let media = self.content_type().split(';').next().unwrap_or("").trim();
        matches!(self.method, Method::Post | Method::Put | Method::Patch)
            && (media.is_empty() || media.eq_ignore_ascii_case(FORM_URLENCODED))
    }
}
